use serde::{Deserialize, Serialize};

use crate::{
    common::{FlatfsError, FlatfsResult},
    path, SAMPLE_FILE_CONTENT, SAMPLE_FILE_PATH,
};

pub const DEFAULT_INODE_CAPACITY: usize = 64;
pub const DEFAULT_BLOCK_SIZE: usize = 4048;
pub const DEFAULT_MAX_PATH_LEN: usize = 256;
pub const DEFAULT_MAX_NAME_LEN: usize = 256;
pub const DEFAULT_MAX_FILE_NAME_LEN: usize = 255;

/// Upper bound on the bytes held by the block store.
pub const MAX_STORE_BYTES: usize = 1 << 30;

/// Fixed resource bounds of one filesystem instance.
///
/// Capacity and block size are fixed for the lifetime of a [`crate::FlatFs`];
/// a snapshot can only be restored with the config it was written with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatfsConfig {
    /// Number of inode slots, root and sample file included.
    pub inode_capacity: usize,
    /// Bytes per data block; a file's size stays strictly below it.
    pub block_size: usize,
    pub max_path_len: usize,
    /// Bound on a directory's name, also the width of the name field.
    pub max_name_len: usize,
    pub max_file_name_len: usize,
}

impl Default for FlatfsConfig {
    fn default() -> Self {
        Self {
            inode_capacity: DEFAULT_INODE_CAPACITY,
            block_size: DEFAULT_BLOCK_SIZE,
            max_path_len: DEFAULT_MAX_PATH_LEN,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            max_file_name_len: DEFAULT_MAX_FILE_NAME_LEN,
        }
    }
}

impl FlatfsConfig {
    pub fn from_json(json: &str) -> FlatfsResult<Self> {
        let config: FlatfsConfig =
            serde_json::from_str(json).map_err(|_| FlatfsError::InvalidConfig("malformed json"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FlatfsResult<()> {
        if self.inode_capacity < 2 {
            return Err(FlatfsError::InvalidConfig(
                "inode_capacity must hold the root and the sample file",
            ));
        }
        if self.block_size <= SAMPLE_FILE_CONTENT.len() {
            return Err(FlatfsError::InvalidConfig(
                "block_size must be larger than the sample file",
            ));
        }
        if self.max_path_len == 0 || self.max_name_len == 0 || self.max_file_name_len == 0 {
            return Err(FlatfsError::InvalidConfig("name bounds must be non-zero"));
        }
        if self.max_file_name_len > self.max_name_len {
            return Err(FlatfsError::InvalidConfig(
                "max_file_name_len must fit in the name field",
            ));
        }
        if self.max_path_len < SAMPLE_FILE_PATH.len()
            || self.max_file_name_len < path::file_name(SAMPLE_FILE_PATH).len()
        {
            return Err(FlatfsError::InvalidConfig(
                "name bounds must hold the sample file",
            ));
        }
        let store_bytes = self
            .inode_capacity
            .checked_mul(self.block_size)
            .ok_or(FlatfsError::InvalidConfig("inode_capacity * block_size overflows"))?;
        if store_bytes > MAX_STORE_BYTES {
            return Err(FlatfsError::InvalidConfig(
                "inode_capacity * block_size exceeds the store limit",
            ));
        }
        let record_bytes = self
            .max_path_len
            .checked_add(self.max_name_len)
            .and_then(|len| len.checked_mul(self.inode_capacity))
            .ok_or(FlatfsError::InvalidConfig("inode table size overflows"))?;
        if record_bytes > MAX_STORE_BYTES {
            return Err(FlatfsError::InvalidConfig(
                "inode table exceeds the store limit",
            ));
        }
        Ok(())
    }
}
