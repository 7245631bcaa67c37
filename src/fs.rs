//! The filesystem engine.
//!
//! Every operation addresses inodes by full path through the
//! [`InodeTable`]; a failed operation leaves table and blocks untouched.

use log::{debug, info, warn};

use crate::{
    block::BlockStore,
    common::{FlatfsAttr, FlatfsError, FlatfsFileType, FlatfsPermission, FlatfsResult, FlatfsTimeSpec},
    config::FlatfsConfig,
    inode::{Inode, InodeTable},
    path,
    transform::{RandomXor, ReadTransform},
    SAMPLE_FILE_CONTENT, SAMPLE_FILE_PATH,
};

pub struct FlatFs {
    config: FlatfsConfig,
    table: InodeTable,
    blocks: BlockStore,
    transform: Box<dyn ReadTransform>,
}

impl FlatFs {
    /// Fresh filesystem holding the root directory and the sample file.
    /// Reads go through [`RandomXor`].
    pub fn new(config: FlatfsConfig) -> FlatfsResult<Self> {
        Self::with_transform(config, Box::new(RandomXor::new()))
    }

    pub fn with_transform(
        config: FlatfsConfig,
        transform: Box<dyn ReadTransform>,
    ) -> FlatfsResult<Self> {
        config.validate()?;
        let mut fs = Self {
            table: InodeTable::new(config.inode_capacity),
            blocks: BlockStore::new(config.inode_capacity, config.block_size),
            config,
            transform,
        };
        fs.install_initial_state();
        Ok(fs)
    }

    /// Reassembles a filesystem from already validated parts.
    pub(crate) fn from_parts(
        config: FlatfsConfig,
        table: InodeTable,
        blocks: BlockStore,
        transform: Box<dyn ReadTransform>,
    ) -> Self {
        Self {
            config,
            table,
            blocks,
            transform,
        }
    }

    fn install_initial_state(&mut self) {
        info!("init filesystem");
        let now = FlatfsTimeSpec::now();

        let root = Inode {
            active: true,
            is_dir: true,
            path: path::ROOT.to_string(),
            name: String::new(),
            mode: FlatfsPermission::with_type(0o777, FlatfsFileType::Directory),
            nlink: 2,
            size: 0,
            atime: now,
            mtime: now,
            block: None,
        };
        let hello = Inode {
            active: true,
            is_dir: false,
            path: SAMPLE_FILE_PATH.to_string(),
            name: path::file_name(SAMPLE_FILE_PATH).to_string(),
            mode: FlatfsPermission::with_type(0o777, FlatfsFileType::RegularFile),
            nlink: 1,
            size: SAMPLE_FILE_CONTENT.len() as u64,
            atime: now,
            mtime: now,
            block: Some(1),
        };

        for slot in 0..self.table.capacity() {
            self.table.free_slot(slot, &mut self.blocks);
        }
        self.install(0, root);
        self.install(1, hello);
        self.blocks.write_at_start(1, SAMPLE_FILE_CONTENT);
    }

    fn install(&mut self, slot: usize, inode: Inode) {
        if let Some(target) = self.table.get_mut(slot) {
            *target = inode;
        }
    }

    pub fn config(&self) -> &FlatfsConfig {
        &self.config
    }

    pub fn table(&self) -> &InodeTable {
        &self.table
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    pub fn set_transform(&mut self, transform: Box<dyn ReadTransform>) {
        self.transform = transform;
    }

    /// Slot of the active inode at `path`.
    pub fn lookup(&self, path: &str) -> FlatfsResult<usize> {
        self.table.find_by_path(path).ok_or(FlatfsError::NotFound)
    }

    pub fn path_of(&self, slot: usize) -> Option<&str> {
        self.table.active(slot).map(|inode| inode.path.as_str())
    }

    pub fn get_attributes(&self, path: &str) -> FlatfsResult<FlatfsAttr> {
        debug!("getattr: (path={})", path);
        let slot = self.lookup(path)?;
        self.attributes_at(slot)
    }

    pub fn attributes_at(&self, slot: usize) -> FlatfsResult<FlatfsAttr> {
        self.table
            .active(slot)
            .map(|inode| inode.attr(slot))
            .ok_or(FlatfsError::NotFound)
    }

    /// `.` and `..` followed by the direct children of `path`.
    ///
    /// Never fails; a path with no inode lists whatever is stored below it.
    pub fn list_directory(&mut self, path: &str) -> Vec<String> {
        debug!("readdir: (path={})", path);
        if let Some(slot) = self.table.find_by_path(path) {
            if let Some(inode) = self.table.get_mut(slot) {
                inode.atime = FlatfsTimeSpec::now();
            }
        }

        let mut entries = vec![".".to_string(), "..".to_string()];
        entries.extend(path::list_children(&self.table, path));
        entries
    }

    pub fn make_directory(&mut self, path: &str, mode: u32) -> FlatfsResult<usize> {
        debug!("mkdir: (path={})", path);
        self.create_inode(path, mode, FlatfsFileType::Directory)
    }

    pub fn create_file(&mut self, path: &str, mode: u32) -> FlatfsResult<usize> {
        debug!("create: (path={})", path);
        self.create_inode(path, mode, FlatfsFileType::RegularFile)
    }

    fn create_inode(&mut self, path: &str, mode: u32, ty: FlatfsFileType) -> FlatfsResult<usize> {
        if !path.starts_with(path::SEPARATOR) || path::file_name(path).is_empty() {
            warn!("invalid path: {:?}", path);
            return Err(FlatfsError::InvalidPath);
        }
        if self.table.find_by_path(path).is_some() {
            warn!("{} already exists", path);
            return Err(FlatfsError::AlreadyExists);
        }
        let slot = self.table.allocate_slot()?;

        let name = path::file_name(path);
        let name_bound = match ty {
            FlatfsFileType::RegularFile => self.config.max_file_name_len,
            FlatfsFileType::Directory => self.config.max_name_len,
        };
        if name.len() > name_bound || path.len() > self.config.max_path_len {
            warn!("name is too long: {}", path);
            return Err(FlatfsError::NameTooLong);
        }

        let is_dir = ty == FlatfsFileType::Directory;
        let now = FlatfsTimeSpec::now();
        let inode = Inode {
            active: true,
            is_dir,
            path: path.to_string(),
            name: name.to_string(),
            mode: FlatfsPermission::with_type(mode, ty),
            nlink: if is_dir { 2 } else { 1 },
            size: 0,
            atime: now,
            mtime: now,
            block: if is_dir { None } else { Some(slot) },
        };
        if !is_dir {
            self.blocks.clear(slot);
        }
        self.install(slot, inode);
        debug!("{} stored at slot {}", path, slot);
        Ok(slot)
    }

    /// Frees the inode at `path`. Missing paths are not an error.
    pub fn remove_file(&mut self, path: &str) -> FlatfsResult<()> {
        debug!("unlink: (path={})", path);
        self.remove(path);
        Ok(())
    }

    /// Frees the directory inode at `path` without touching entries below it.
    pub fn remove_directory(&mut self, path: &str) -> FlatfsResult<()> {
        debug!("rmdir: (path={})", path);
        self.remove(path);
        Ok(())
    }

    fn remove(&mut self, path: &str) {
        if let Some(slot) = self.table.find_by_path(path) {
            debug!("inode found at {}", slot);
            self.table.free_slot(slot, &mut self.blocks);
        }
    }

    /// Rejects an inode without any read bit. A missing path opens fine.
    pub fn open(&mut self, path: &str) -> FlatfsResult<()> {
        debug!("open: (path={})", path);
        let Some(slot) = self.table.find_by_path(path) else {
            return Ok(());
        };
        let Some(inode) = self.table.get_mut(slot) else {
            return Ok(());
        };
        if !inode.mode.intersects(FlatfsPermission::S_IRUGO) {
            warn!("permission denied: {}", path);
            return Err(FlatfsError::PermissionDenied);
        }
        inode.atime = FlatfsTimeSpec::now();
        Ok(())
    }

    /// Stored content, at most `size` bytes, passed through the read transform.
    ///
    /// The whole content is returned from its start whatever `offset` is;
    /// an unknown path reads as empty.
    pub fn read(&mut self, path: &str, size: usize, _offset: u64) -> Vec<u8> {
        debug!("read: (path={})", path);
        let Some(slot) = self.table.find_by_path(path) else {
            return Vec::new();
        };
        let Some(inode) = self.table.active(slot) else {
            return Vec::new();
        };
        let Some(block) = inode.block else {
            return Vec::new();
        };

        let len = core::cmp::min(inode.size as usize, size);
        let mut data = self.blocks.block(block)[..len].to_vec();
        self.transform.apply(&mut data);
        data
    }

    pub fn release(&self, path: &str) -> FlatfsResult<()> {
        debug!("release: (path={})", path);
        Ok(())
    }

    /// Replaces the whole content of the file at `path` with `buf`.
    ///
    /// `offset` is ignored. Fails with [`FlatfsError::FileTooLarge`] once
    /// `buf.len()` plus the current size reaches the block size.
    pub fn write(&mut self, path: &str, buf: &[u8], _offset: u64) -> FlatfsResult<usize> {
        debug!("write: (path={}, len={})", path, buf.len());
        let slot = self
            .table
            .find_by_path(path)
            .filter(|slot| self.table.get(*slot).is_some_and(|inode| !inode.is_dir))
            .ok_or(FlatfsError::NotFound)?;
        let block_size = self.blocks.block_size();
        let Some(inode) = self.table.get_mut(slot) else {
            return Err(FlatfsError::NotFound);
        };
        let Some(block) = inode.block else {
            return Err(FlatfsError::NotFound);
        };

        if buf.len() as u64 + inode.size >= block_size as u64 {
            warn!("not enough room in {}", path);
            return Err(FlatfsError::FileTooLarge);
        }

        inode.mtime = FlatfsTimeSpec::now();
        inode.size = buf.len() as u64;
        self.blocks.clear(block);
        self.blocks.write_at_start(block, buf);
        Ok(buf.len())
    }

    /// Always succeeds and leaves the file as it is.
    pub fn truncate(&mut self, path: &str, offset: u64) -> FlatfsResult<()> {
        debug!("truncate: (path={}, offset={})", path, offset);
        Ok(())
    }

    /// Applies new permission bits, keeping the inode's file type.
    pub fn change_mode(&mut self, path: &str, mode: u32) -> FlatfsResult<()> {
        debug!("chmod: (path={}, mode={:o})", path, mode);
        let slot = self.lookup(path)?;
        let inode = self.table.get_mut(slot).ok_or(FlatfsError::NotFound)?;
        let ty = if inode.is_dir {
            FlatfsFileType::Directory
        } else {
            FlatfsFileType::RegularFile
        };
        inode.mode = FlatfsPermission::with_type(mode, ty);
        Ok(())
    }
}
