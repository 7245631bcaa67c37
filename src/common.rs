//! Types shared by the engine, the snapshot codec and the host adapter.

use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;

pub type FlatfsResult<T> = Result<T, FlatfsError>;

#[derive(Debug, Clone, PartialEq, Eq, onlyerror::Error)]
pub enum FlatfsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("file exists")]
    AlreadyExists,
    #[error("no free inode slot left")]
    NoFreeInode,
    #[error("file name too long")]
    NameTooLong,
    #[error("not enough room in file")]
    FileTooLarge,
    #[error("permission denied")]
    PermissionDenied,
    #[error("path must be absolute and end in a name")]
    InvalidPath,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(&'static str),
}

impl From<std::io::Error> for FlatfsError {
    fn from(e: std::io::Error) -> Self {
        FlatfsError::Io(e.to_string())
    }
}

bitflags! {
    /// Type and permission bits of an inode's mode.
    pub struct FlatfsPermission: u32 {
        const S_IFMT = 0o170000;
        const S_IFREG = 0o100000;
        const S_IFDIR = 0o040000;

        const S_ISUID = 0o4000;
        const S_ISGID = 0o2000;
        const S_ISVTX = 0o1000;

        const S_IRUSR = 0o400;
        const S_IWUSR = 0o200;
        const S_IXUSR = 0o100;
        const S_IRGRP = 0o040;
        const S_IWGRP = 0o020;
        const S_IXGRP = 0o010;
        const S_IROTH = 0o004;
        const S_IWOTH = 0o002;
        const S_IXOTH = 0o001;

        const S_IRUGO = Self::S_IRUSR.bits | Self::S_IRGRP.bits | Self::S_IROTH.bits;
    }
}

impl FlatfsPermission {
    /// Permission bits of `mode` with the type bits replaced by those of `ty`.
    pub fn with_type(mode: u32, ty: FlatfsFileType) -> Self {
        let perm = FlatfsPermission::from_bits_truncate(mode & 0o7777);
        match ty {
            FlatfsFileType::RegularFile => perm | FlatfsPermission::S_IFREG,
            FlatfsFileType::Directory => perm | FlatfsPermission::S_IFDIR,
        }
    }

    pub fn is_dir(&self) -> bool {
        (*self & FlatfsPermission::S_IFMT) == FlatfsPermission::S_IFDIR
    }

    pub fn perm_bits(&self) -> u16 {
        (self.bits() & 0o7777) as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatfsFileType {
    RegularFile,
    Directory,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlatfsTimeSpec {
    pub sec: u64,
    pub nsec: u32,
}

impl FlatfsTimeSpec {
    pub const ENCODED_LEN: usize = 12;

    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| FlatfsTimeSpec {
                sec: d.as_secs(),
                nsec: d.subsec_nanos(),
            })
            .unwrap_or_default()
    }

    pub fn to_be_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[..8].copy_from_slice(&self.sec.to_be_bytes());
        buf[8..].copy_from_slice(&self.nsec.to_be_bytes());
        buf
    }

    pub fn to_system_time(&self) -> SystemTime {
        UNIX_EPOCH + std::time::Duration::new(self.sec, self.nsec)
    }
}

impl TryFrom<&[u8]> for FlatfsTimeSpec {
    type Error = FlatfsError;

    /// Decodes exactly [`FlatfsTimeSpec::ENCODED_LEN`] bytes.
    fn try_from(value: &[u8]) -> FlatfsResult<Self> {
        if value.len() != Self::ENCODED_LEN {
            return Err(FlatfsError::CorruptSnapshot("bad timestamp length"));
        }
        Ok(FlatfsTimeSpec {
            sec: crate::u64!(value[..8]),
            nsec: crate::u32!(value[8..12]),
        })
    }
}

/// Attributes reported for one inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatfsAttr {
    pub slot: usize,
    pub mode: FlatfsPermission,
    pub nlink: u32,
    pub size: u64,
    pub atime: FlatfsTimeSpec,
    pub mtime: FlatfsTimeSpec,
}

impl FlatfsAttr {
    pub fn file_type(&self) -> FlatfsFileType {
        if self.mode.is_dir() {
            FlatfsFileType::Directory
        } else {
            FlatfsFileType::RegularFile
        }
    }
}
