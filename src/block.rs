/// Fixed array of fixed-size data blocks, one per inode slot.
///
/// Blocks live back to back in one buffer so the whole store can be dumped
/// and reloaded in slot order.
pub struct BlockStore {
    block_size: usize,
    bytes: Vec<u8>,
}

impl BlockStore {
    pub fn new(count: usize, block_size: usize) -> Self {
        Self {
            block_size,
            bytes: vec![0u8; count * block_size],
        }
    }

    /// Wraps a raw dump; `bytes` must be a whole number of blocks.
    pub(crate) fn from_bytes(bytes: Vec<u8>, block_size: usize) -> Self {
        debug_assert_eq!(bytes.len() % block_size, 0);
        Self { block_size, bytes }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn count(&self) -> usize {
        self.bytes.len() / self.block_size
    }

    pub fn block(&self, slot: usize) -> &[u8] {
        let start = slot * self.block_size;
        &self.bytes[start..start + self.block_size]
    }

    /// Overwrites the block from position zero.
    pub fn write_at_start(&mut self, slot: usize, data: &[u8]) -> usize {
        let start = slot * self.block_size;
        let len = core::cmp::min(data.len(), self.block_size);
        self.bytes[start..start + len].copy_from_slice(&data[..len]);
        len
    }

    pub fn clear(&mut self, slot: usize) {
        let start = slot * self.block_size;
        self.bytes[start..start + self.block_size].fill(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
