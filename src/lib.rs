//! In-memory filesystem engine addressed purely by path strings.
//!
//! A fixed table of inode slots holds every file and directory, each keyed
//! by its full path; file contents live in a fixed block co-indexed with the
//! slot. The `fuse` feature mounts the engine through `fuser`.

mod block;
pub mod common;
pub mod config;
pub mod fs;
pub mod inode;
pub mod path;
pub mod shared;
pub mod snapshot;
pub mod transform;

#[cfg(feature = "fuse")]
pub mod fuse;

#[cfg(test)]
mod flatfs_test;

pub use block::BlockStore;
pub use common::{FlatfsAttr, FlatfsError, FlatfsFileType, FlatfsPermission, FlatfsResult};
pub use config::FlatfsConfig;
pub use fs::FlatFs;
pub use shared::SharedFlatFs;

/// File installed by every fresh filesystem, next to the root.
pub const SAMPLE_FILE_PATH: &str = "/hello";
pub const SAMPLE_FILE_CONTENT: &[u8] = b"Hello World!";

#[macro_export]
macro_rules! u32 {
    ($x:expr) => {
        u32::from_be_bytes($x.try_into().unwrap())
    };
}

#[macro_export]
macro_rules! u64 {
    ($x:expr) => {
        u64::from_be_bytes($x.try_into().unwrap())
    };
}
