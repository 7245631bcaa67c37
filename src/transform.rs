//! Byte transform applied to file content on every read.
//!
//! Writes store bytes untouched and no key is kept, so [`RandomXor`] output
//! does not round-trip. Hosts that need plain reads install [`Identity`].

use rand::{rngs::StdRng, Rng, SeedableRng};

pub trait ReadTransform: Send {
    /// Transforms one read's worth of bytes in place.
    fn apply(&mut self, data: &mut [u8]);
}

/// XORs every byte of a read with one key drawn anew for each call.
pub struct RandomXor {
    rng: StdRng,
}

impl RandomXor {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomXor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadTransform for RandomXor {
    fn apply(&mut self, data: &mut [u8]) {
        let key: u8 = self.rng.gen_range(0..255);
        data.iter_mut().for_each(|b| *b ^= key);
    }
}

/// Leaves content unchanged.
#[derive(Default)]
pub struct Identity;

impl ReadTransform for Identity {
    fn apply(&mut self, _data: &mut [u8]) {}
}
