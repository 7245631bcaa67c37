//! `fuser` host adapter.
//!
//! The kernel addresses nodes by inode number; the engine addresses them by
//! path. Inode numbers are slot indices shifted by one so that slot 0, the
//! root directory, is [`FUSE_ROOT_ID`].

use std::{
    ffi::OsStr,
    path::PathBuf,
    time::{Duration, SystemTime},
};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
    FUSE_ROOT_ID,
};
use libc::c_int;
use log::{debug, error, info};

use crate::{
    common::{FlatfsAttr, FlatfsError, FlatfsFileType},
    fs::FlatFs,
    path, snapshot,
};

const TTL: Duration = Duration::from_secs(1);

pub fn errno(e: &FlatfsError) -> c_int {
    match e {
        FlatfsError::NotFound => libc::ENOENT,
        FlatfsError::AlreadyExists => libc::EEXIST,
        FlatfsError::NoFreeInode => libc::ENOSPC,
        FlatfsError::NameTooLong => libc::ENAMETOOLONG,
        FlatfsError::FileTooLarge => libc::EFBIG,
        FlatfsError::PermissionDenied => libc::EACCES,
        FlatfsError::InvalidPath | FlatfsError::InvalidConfig(_) => libc::EINVAL,
        FlatfsError::Io(_) | FlatfsError::CorruptSnapshot(_) => libc::EIO,
    }
}

fn ino_of(slot: usize) -> u64 {
    slot as u64 + FUSE_ROOT_ID
}

fn slot_of(ino: u64) -> usize {
    ino.saturating_sub(FUSE_ROOT_ID) as usize
}

fn kind_of(ty: FlatfsFileType) -> FileType {
    match ty {
        FlatfsFileType::RegularFile => FileType::RegularFile,
        FlatfsFileType::Directory => FileType::Directory,
    }
}

pub struct FlatfsFuse {
    fs: FlatFs,
    /// Where teardown writes the snapshot; `None` skips it.
    snapshot_dir: Option<PathBuf>,
    /// Per-slot generation, bumped each time a slot is handed out again.
    generations: Vec<u64>,
}

impl FlatfsFuse {
    pub fn new(fs: FlatFs, snapshot_dir: Option<PathBuf>) -> Self {
        let generations = vec![0; fs.table().capacity()];
        Self {
            fs,
            snapshot_dir,
            generations,
        }
    }

    fn generation(&self, slot: usize) -> u64 {
        self.generations.get(slot).copied().unwrap_or(0)
    }

    fn next_generation(&mut self, slot: usize) -> u64 {
        match self.generations.get_mut(slot) {
            Some(generation) => {
                *generation = generation.wrapping_add(1);
                *generation
            }
            None => 0,
        }
    }

    /// Create a node and return its path and generation.
    fn create_node(
        &mut self,
        parent: u64,
        name: &OsStr,
        mode: u32,
        ty: FlatfsFileType,
    ) -> Result<(String, u64), c_int> {
        let path = self.child_path(parent, name)?;
        let slot = match ty {
            FlatfsFileType::Directory => self.fs.make_directory(&path, mode),
            FlatfsFileType::RegularFile => self.fs.create_file(&path, mode),
        }
        .map_err(|e| errno(&e))?;
        Ok((path, self.next_generation(slot)))
    }

    fn file_attr(&self, req: &Request<'_>, attr: &FlatfsAttr) -> FileAttr {
        let mtime = attr.mtime.to_system_time();
        FileAttr {
            ino: ino_of(attr.slot),
            size: attr.size,
            blocks: (attr.size + 511) / 512,
            atime: attr.atime.to_system_time(),
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind: kind_of(attr.file_type()),
            perm: attr.mode.perm_bits(),
            nlink: attr.nlink,
            uid: req.uid(),
            gid: req.gid(),
            rdev: 0,
            blksize: self.fs.config().block_size as u32,
            flags: 0,
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, c_int> {
        self.fs
            .path_of(slot_of(ino))
            .map(str::to_string)
            .ok_or(libc::ENOENT)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let dir = self.path_of(parent)?;
        let name = name.to_str().ok_or(libc::EINVAL)?;
        Ok(path::join(&dir, name))
    }

    fn entry_attr(&self, req: &Request<'_>, path: &str) -> Result<FileAttr, c_int> {
        let attr = self.fs.get_attributes(path).map_err(|e| errno(&e))?;
        Ok(self.file_attr(req, &attr))
    }
}

impl Filesystem for FlatfsFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(
            "flatfs ready: {} of {} inodes in use",
            self.fs.table().active_count(),
            self.fs.table().capacity()
        );
        Ok(())
    }

    fn destroy(&mut self) {
        info!("destroy filesystem");
        let Some(dir) = &self.snapshot_dir else {
            return;
        };
        if let Err(e) = snapshot::dump_to_dir(&self.fs, dir) {
            error!("failed to write snapshot to {}: {}", dir.display(), e);
        }
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self
            .child_path(parent, name)
            .and_then(|path| self.entry_attr(req, &path))
        {
            Ok(attr) => reply.entry(&TTL, &attr, self.generation(slot_of(attr.ino))),
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.fs.attributes_at(slot_of(ino)) {
            Ok(attr) => reply.attr(&TTL, &self.file_attr(req, &attr)),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        if let Some(mode) = mode {
            if let Err(e) = self.fs.change_mode(&path, mode) {
                return reply.error(errno(&e));
            }
        }
        if let Some(size) = size {
            if let Err(e) = self.fs.truncate(&path, size) {
                return reply.error(errno(&e));
            }
        }
        match self.entry_attr(req, &path) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let dir = match self.path_of(ino) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        let parent_ino = self
            .fs
            .lookup(path::parent(&dir))
            .map(ino_of)
            .unwrap_or(FUSE_ROOT_ID);

        let entries = self.fs.list_directory(&dir);
        for (i, name) in entries.iter().enumerate().skip(offset as usize) {
            let (child_ino, kind) = match name.as_str() {
                "." => (ino, FileType::Directory),
                ".." => (parent_ino, FileType::Directory),
                _ => {
                    let Ok(attr) = self.fs.get_attributes(&path::join(&dir, name)) else {
                        continue;
                    };
                    (ino_of(attr.slot), kind_of(attr.file_type()))
                }
            };
            if reply.add(child_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        match self
            .create_node(parent, name, mode, FlatfsFileType::Directory)
            .and_then(|(path, generation)| Ok((self.entry_attr(req, &path)?, generation)))
        {
            Ok((attr, generation)) => reply.entry(&TTL, &attr, generation),
            Err(e) => reply.error(e),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self
            .create_node(parent, name, mode, FlatfsFileType::RegularFile)
            .and_then(|(path, generation)| Ok((self.entry_attr(req, &path)?, generation)))
        {
            Ok((attr, generation)) => reply.created(&TTL, &attr, generation, 0, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.child_path(parent, name) {
            Ok(path) => match self.fs.remove_file(&path) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(errno(&e)),
            },
            Err(e) => reply.error(e),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.child_path(parent, name) {
            Ok(path) => match self.fs.remove_directory(&path) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(errno(&e)),
            },
            Err(e) => reply.error(e),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        match self.fs.open(&path) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.path_of(ino) {
            Ok(path) => {
                let data = self.fs.read(&path, size as usize, offset.max(0) as u64);
                debug!("read {} bytes from {}", data.len(), path);
                reply.data(&data);
            }
            Err(e) => reply.error(e),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(e) => return reply.error(e),
        };
        match self.fs.write(&path, data, offset.max(0) as u64) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.path_of(ino) {
            Ok(path) => match self.fs.release(&path) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(errno(&e)),
            },
            // released after removal
            Err(_) => reply.ok(),
        }
    }
}
