use std::sync::Arc;

use spin::Mutex;

use crate::{
    common::{FlatfsAttr, FlatfsResult},
    fs::FlatFs,
    snapshot::{self, SnapshotStorage},
};

/// Cloneable handle that serializes every operation on one [`FlatFs`].
///
/// Each call holds the lock for the whole operation, so callers on several
/// threads observe the same one-at-a-time order a single host would.
#[derive(Clone)]
pub struct SharedFlatFs {
    inner: Arc<Mutex<FlatFs>>,
}

impl SharedFlatFs {
    pub fn new(fs: FlatFs) -> Self {
        Self {
            inner: Arc::new(Mutex::new(fs)),
        }
    }

    /// Runs `f` with exclusive access to the filesystem.
    pub fn with<R>(&self, f: impl FnOnce(&mut FlatFs) -> R) -> R {
        let mut fs = self.inner.lock();
        f(&mut fs)
    }

    pub fn get_attributes(&self, path: &str) -> FlatfsResult<FlatfsAttr> {
        self.inner.lock().get_attributes(path)
    }

    pub fn list_directory(&self, path: &str) -> Vec<String> {
        self.inner.lock().list_directory(path)
    }

    pub fn make_directory(&self, path: &str, mode: u32) -> FlatfsResult<usize> {
        self.inner.lock().make_directory(path, mode)
    }

    pub fn create_file(&self, path: &str, mode: u32) -> FlatfsResult<usize> {
        self.inner.lock().create_file(path, mode)
    }

    pub fn remove_file(&self, path: &str) -> FlatfsResult<()> {
        self.inner.lock().remove_file(path)
    }

    pub fn remove_directory(&self, path: &str) -> FlatfsResult<()> {
        self.inner.lock().remove_directory(path)
    }

    pub fn open(&self, path: &str) -> FlatfsResult<()> {
        self.inner.lock().open(path)
    }

    pub fn read(&self, path: &str, size: usize, offset: u64) -> Vec<u8> {
        self.inner.lock().read(path, size, offset)
    }

    pub fn write(&self, path: &str, buf: &[u8], offset: u64) -> FlatfsResult<usize> {
        self.inner.lock().write(path, buf, offset)
    }

    pub fn release(&self, path: &str) -> FlatfsResult<()> {
        self.inner.lock().release(path)
    }

    pub fn change_mode(&self, path: &str, mode: u32) -> FlatfsResult<()> {
        self.inner.lock().change_mode(path, mode)
    }

    pub fn truncate(&self, path: &str, offset: u64) -> FlatfsResult<()> {
        self.inner.lock().truncate(path, offset)
    }

    pub fn dump(
        &self,
        structure: &dyn SnapshotStorage,
        blocks: &dyn SnapshotStorage,
    ) -> FlatfsResult<()> {
        snapshot::dump(&self.inner.lock(), structure, blocks)
    }
}
