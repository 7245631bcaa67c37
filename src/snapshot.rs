//! Snapshot codec.
//!
//! A snapshot is two positional dumps: the inode table as fixed-length
//! records in slot order, and the raw data block store. Neither carries a
//! header; both are read back with the [`FlatfsConfig`] that wrote them.
//!
//! Record layout, big-endian:
//!
//! | field  | bytes          |
//! |--------|----------------|
//! | active | 1              |
//! | is_dir | 1              |
//! | path   | `max_path_len` |
//! | name   | `max_name_len` |
//! | mode   | 4              |
//! | nlink  | 4              |
//! | size   | 8              |
//! | atime  | 12             |
//! | mtime  | 12             |
//! | index  | 4              |

use std::{
    collections::HashSet,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use log::info;
use spin::Mutex;

use crate::{
    block::BlockStore,
    common::{FlatfsError, FlatfsPermission, FlatfsResult, FlatfsTimeSpec},
    config::FlatfsConfig,
    fs::FlatFs,
    inode::{Inode, InodeTable},
    path,
    transform::ReadTransform,
};

pub const STRUCTURE_FILE: &str = "file_structure.bin";
pub const BLOCKS_FILE: &str = "super.bin";

/// Fixed bytes of a record besides the path and name fields.
const RECORD_FIXED_LEN: usize = 2 + 4 + 4 + 8 + 2 * FlatfsTimeSpec::ENCODED_LEN + 4;

/// Byte medium one snapshot artifact is written to.
pub trait SnapshotStorage {
    fn write(&self, offset: u64, data: &[u8]) -> FlatfsResult<()>;
    fn read(&self, offset: u64, buf: &mut [u8]) -> FlatfsResult<()>;
    fn len(&self) -> FlatfsResult<u64>;
    fn truncate(&self, length: u64) -> FlatfsResult<()>;
    fn flush(&self) -> FlatfsResult<()>;
}

pub struct FileStorage {
    file: File,
}

impl FileStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> FlatfsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Opens an existing artifact without creating it.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> FlatfsResult<Self> {
        let file = File::open(path)?;
        Ok(Self { file })
    }
}

impl SnapshotStorage for FileStorage {
    fn write(&self, offset: u64, data: &[u8]) -> FlatfsResult<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> FlatfsResult<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn len(&self) -> FlatfsResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&self, length: u64) -> FlatfsResult<()> {
        self.file.set_len(length)?;
        Ok(())
    }

    fn flush(&self) -> FlatfsResult<()> {
        let mut file = &self.file;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemStorage {
    data: Mutex<Vec<u8>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl SnapshotStorage for MemStorage {
    fn write(&self, offset: u64, data: &[u8]) -> FlatfsResult<()> {
        let mut storage = self.data.lock();
        let end = offset as usize + data.len();
        if end > storage.len() {
            storage.resize(end, 0);
        }
        storage[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> FlatfsResult<()> {
        let storage = self.data.lock();
        let end = offset as usize + buf.len();
        if end > storage.len() {
            return Err(FlatfsError::Io("read out of bounds".to_string()));
        }
        buf.copy_from_slice(&storage[offset as usize..end]);
        Ok(())
    }

    fn len(&self) -> FlatfsResult<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn truncate(&self, length: u64) -> FlatfsResult<()> {
        self.data.lock().truncate(length as usize);
        Ok(())
    }

    fn flush(&self) -> FlatfsResult<()> {
        Ok(())
    }
}

pub fn record_len(config: &FlatfsConfig) -> usize {
    config.max_path_len + config.max_name_len + RECORD_FIXED_LEN
}

fn put_str(out: &mut Vec<u8>, value: &str, width: usize) -> FlatfsResult<()> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(FlatfsError::NameTooLong);
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + width - bytes.len(), 0);
    Ok(())
}

fn get_str(field: &[u8]) -> FlatfsResult<String> {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8(field[..end].to_vec())
        .map_err(|_| FlatfsError::CorruptSnapshot("string field is not utf-8"))
}

/// Appends the record of `inode`; fails if its path or name does not fit
/// the fields, leaving `out` as it was.
pub fn encode_inode(
    inode: &Inode,
    slot: usize,
    config: &FlatfsConfig,
    out: &mut Vec<u8>,
) -> FlatfsResult<()> {
    let start = out.len();
    out.push(inode.active as u8);
    out.push(inode.is_dir as u8);
    if let Err(e) = put_str(out, &inode.path, config.max_path_len)
        .and_then(|_| put_str(out, &inode.name, config.max_name_len))
    {
        out.truncate(start);
        return Err(e);
    }
    out.extend_from_slice(&inode.mode.bits().to_be_bytes());
    out.extend_from_slice(&inode.nlink.to_be_bytes());
    out.extend_from_slice(&inode.size.to_be_bytes());
    out.extend_from_slice(&inode.atime.to_be_bytes());
    out.extend_from_slice(&inode.mtime.to_be_bytes());
    out.extend_from_slice(&(slot as u32).to_be_bytes());
    Ok(())
}

/// Decodes one record into its stored slot index and inode.
///
/// The inode's block binding is left unset.
pub fn decode_inode(record: &[u8], config: &FlatfsConfig) -> FlatfsResult<(usize, Inode)> {
    if record.len() != record_len(config) {
        return Err(FlatfsError::CorruptSnapshot("bad record length"));
    }
    let (flags, rest) = record.split_at(2);
    let (path, rest) = rest.split_at(config.max_path_len);
    let (name, rest) = rest.split_at(config.max_name_len);
    let (mode, rest) = rest.split_at(4);
    let (nlink, rest) = rest.split_at(4);
    let (size, rest) = rest.split_at(8);
    let (atime, rest) = rest.split_at(FlatfsTimeSpec::ENCODED_LEN);
    let (mtime, index) = rest.split_at(FlatfsTimeSpec::ENCODED_LEN);

    let inode = Inode {
        active: flags[0] != 0,
        is_dir: flags[1] != 0,
        path: get_str(path)?,
        name: get_str(name)?,
        mode: FlatfsPermission::from_bits_truncate(crate::u32!(mode)),
        nlink: crate::u32!(nlink),
        size: crate::u64!(size),
        atime: FlatfsTimeSpec::try_from(atime)?,
        mtime: FlatfsTimeSpec::try_from(mtime)?,
        block: None,
    };
    Ok((crate::u32!(index) as usize, inode))
}

/// Writes the whole inode table to `structure` and the whole block store
/// to `blocks`, replacing what they held.
pub fn dump(
    fs: &FlatFs,
    structure: &dyn SnapshotStorage,
    blocks: &dyn SnapshotStorage,
) -> FlatfsResult<()> {
    let config = fs.config();
    let mut table = Vec::with_capacity(record_len(config) * config.inode_capacity);
    for (slot, inode) in fs.table().slots().iter().enumerate() {
        encode_inode(inode, slot, config, &mut table)?;
    }

    structure.truncate(0)?;
    structure.write(0, &table)?;
    structure.flush()?;

    blocks.truncate(0)?;
    blocks.write(0, fs.blocks().as_bytes())?;
    blocks.flush()?;

    info!(
        "snapshot written: {} inode records, {} block bytes",
        config.inode_capacity,
        fs.blocks().as_bytes().len()
    );
    Ok(())
}

/// Rebuilds a filesystem from a snapshot written by [`dump`] with the same
/// config, checking that it describes a consistent table.
pub fn restore(
    config: FlatfsConfig,
    structure: &dyn SnapshotStorage,
    blocks: &dyn SnapshotStorage,
    transform: Box<dyn ReadTransform>,
) -> FlatfsResult<FlatFs> {
    config.validate()?;
    let rec_len = record_len(&config);
    let capacity = config.inode_capacity;

    if structure.len()? != (rec_len * capacity) as u64 {
        return Err(FlatfsError::CorruptSnapshot("inode table length mismatch"));
    }
    if blocks.len()? != (config.block_size * capacity) as u64 {
        return Err(FlatfsError::CorruptSnapshot("block store length mismatch"));
    }

    let mut raw = vec![0u8; rec_len * capacity];
    structure.read(0, &mut raw)?;
    let mut block_bytes = vec![0u8; config.block_size * capacity];
    blocks.read(0, &mut block_bytes)?;

    let mut slots = Vec::with_capacity(capacity);
    let mut seen = HashSet::new();
    for (slot, record) in raw.chunks_exact(rec_len).enumerate() {
        let (index, mut inode) = decode_inode(record, &config)?;
        if index != slot {
            return Err(FlatfsError::CorruptSnapshot("slot index out of order"));
        }
        if !inode.active {
            slots.push(Inode::default());
            continue;
        }
        check_active(&inode, &config)?;
        if !seen.insert(inode.path.clone()) {
            return Err(FlatfsError::CorruptSnapshot("duplicate path"));
        }
        if !inode.is_dir {
            inode.block = Some(slot);
        }
        slots.push(inode);
    }

    let root_ok = slots
        .first()
        .is_some_and(|root| root.active && root.is_dir && root.path == path::ROOT);
    if !root_ok {
        return Err(FlatfsError::CorruptSnapshot("root directory missing"));
    }

    let block_size = config.block_size;
    info!("snapshot restored: {} active inodes", seen.len());
    Ok(FlatFs::from_parts(
        config,
        InodeTable::from_slots(slots),
        BlockStore::from_bytes(block_bytes, block_size),
        transform,
    ))
}

fn check_active(inode: &Inode, config: &FlatfsConfig) -> FlatfsResult<()> {
    if !inode.path.starts_with(path::SEPARATOR) {
        return Err(FlatfsError::CorruptSnapshot("path is not absolute"));
    }
    if inode.is_dir != inode.mode.is_dir() {
        return Err(FlatfsError::CorruptSnapshot("mode type disagrees with inode kind"));
    }
    if inode.is_dir && inode.size != 0 {
        return Err(FlatfsError::CorruptSnapshot("directory with data"));
    }
    if inode.size >= config.block_size as u64 {
        return Err(FlatfsError::CorruptSnapshot("size exceeds block"));
    }
    Ok(())
}

/// [`dump`] into the two artifact files under `dir`.
pub fn dump_to_dir(fs: &FlatFs, dir: &Path) -> FlatfsResult<()> {
    let structure = FileStorage::open(dir.join(STRUCTURE_FILE))?;
    let blocks = FileStorage::open(dir.join(BLOCKS_FILE))?;
    dump(fs, &structure, &blocks)
}

/// Whether both artifact files exist under `dir`.
pub fn exists_in_dir(dir: &Path) -> bool {
    dir.join(STRUCTURE_FILE).is_file() && dir.join(BLOCKS_FILE).is_file()
}

/// [`restore`] from the two artifact files under `dir`.
pub fn restore_from_dir(
    config: FlatfsConfig,
    dir: &Path,
    transform: Box<dyn ReadTransform>,
) -> FlatfsResult<FlatFs> {
    let structure = FileStorage::open_read_only(dir.join(STRUCTURE_FILE))?;
    let blocks = FileStorage::open_read_only(dir.join(BLOCKS_FILE))?;
    restore(config, &structure, &blocks, transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Identity;

    fn small_config() -> FlatfsConfig {
        FlatfsConfig {
            inode_capacity: 4,
            block_size: 16,
            max_path_len: 8,
            max_name_len: 8,
            max_file_name_len: 8,
        }
    }

    #[test]
    fn test_record_layout() {
        let config = small_config();
        let inode = Inode {
            active: true,
            is_dir: false,
            path: "/ab".to_string(),
            name: "ab".to_string(),
            mode: FlatfsPermission::from_bits_truncate(0o100644),
            nlink: 1,
            size: 3,
            atime: FlatfsTimeSpec { sec: 1, nsec: 2 },
            mtime: FlatfsTimeSpec { sec: 3, nsec: 4 },
            block: Some(2),
        };
        let mut out = Vec::new();
        encode_inode(&inode, 2, &config, &mut out).unwrap();

        assert_eq!(out.len(), record_len(&config));
        assert_eq!(out.len(), 8 + 8 + 46);
        assert_eq!(&out[..2], &[1, 0]);
        assert_eq!(&out[2..10], b"/ab\0\0\0\0\0");
        assert_eq!(&out[10..18], b"ab\0\0\0\0\0\0");
        assert_eq!(&out[18..22], &0o100644u32.to_be_bytes());
        assert_eq!(&out[out.len() - 4..], &2u32.to_be_bytes());

        let (index, decoded) = decode_inode(&out, &config).unwrap();
        assert_eq!(index, 2);
        assert_eq!(decoded, Inode { block: None, ..inode });
    }

    #[test]
    fn test_encode_rejects_strings_wider_than_fields() {
        let config = small_config();
        let inode = Inode {
            active: true,
            path: "/too-long-path".to_string(),
            name: "ok".to_string(),
            ..Inode::default()
        };
        let mut out = vec![7u8];
        assert_eq!(
            encode_inode(&inode, 1, &config, &mut out),
            Err(FlatfsError::NameTooLong)
        );
        assert_eq!(out, vec![7u8]);

        let inode = Inode {
            path: "/ok".to_string(),
            name: "name-too-wide".to_string(),
            ..inode
        };
        assert_eq!(
            encode_inode(&inode, 1, &config, &mut out),
            Err(FlatfsError::NameTooLong)
        );
        assert_eq!(out, vec![7u8]);
    }

    #[test]
    fn test_decode_rejects_short_record() {
        let config = small_config();
        assert_eq!(
            decode_inode(&[0u8; 10], &config).err(),
            Some(FlatfsError::CorruptSnapshot("bad record length"))
        );
    }

    #[test]
    fn test_dump_sizes() {
        let config = small_config();
        let fs = FlatFs::with_transform(config.clone(), Box::new(Identity)).unwrap();
        let structure = MemStorage::new();
        let blocks = MemStorage::new();
        dump(&fs, &structure, &blocks).unwrap();

        assert_eq!(structure.bytes().len(), record_len(&config) * 4);
        let raw = blocks.bytes();
        assert_eq!(raw.len(), 16 * 4);
        assert_eq!(&raw[16..28], b"Hello World!");
    }

    #[test]
    fn test_restore_rejects_wrong_config() {
        let fs = FlatFs::with_transform(small_config(), Box::new(Identity)).unwrap();
        let structure = MemStorage::new();
        let blocks = MemStorage::new();
        dump(&fs, &structure, &blocks).unwrap();

        let other = FlatfsConfig {
            inode_capacity: 5,
            ..small_config()
        };
        assert_eq!(
            restore(other, &structure, &blocks, Box::new(Identity)).err(),
            Some(FlatfsError::CorruptSnapshot("inode table length mismatch"))
        );
    }

    #[test]
    fn test_restore_rejects_duplicate_paths() {
        let config = small_config();
        let fs = FlatFs::with_transform(config.clone(), Box::new(Identity)).unwrap();
        let structure = MemStorage::new();
        let blocks = MemStorage::new();
        dump(&fs, &structure, &blocks).unwrap();

        // copy the /hello record into slot 2, fixing up its index
        let rec_len = record_len(&config);
        let mut record = structure.bytes()[rec_len..2 * rec_len].to_vec();
        record[rec_len - 4..].copy_from_slice(&2u32.to_be_bytes());
        structure.write((2 * rec_len) as u64, &record).unwrap();

        assert_eq!(
            restore(config, &structure, &blocks, Box::new(Identity)).err(),
            Some(FlatfsError::CorruptSnapshot("duplicate path"))
        );
    }

    #[test]
    fn test_restore_requires_root() {
        let config = small_config();
        let mut fs = FlatFs::with_transform(config.clone(), Box::new(Identity)).unwrap();
        fs.remove_directory("/").unwrap();
        let structure = MemStorage::new();
        let blocks = MemStorage::new();
        dump(&fs, &structure, &blocks).unwrap();

        assert_eq!(
            restore(config, &structure, &blocks, Box::new(Identity)).err(),
            Some(FlatfsError::CorruptSnapshot("root directory missing"))
        );
    }

    #[test]
    fn test_file_storage_roundtrip_on_disk() {
        let dir = std::env::temp_dir().join(format!("flatfs-snapshot-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let config = small_config();
        let mut fs = FlatFs::with_transform(config.clone(), Box::new(Identity)).unwrap();
        fs.create_file("/f", 0o640).unwrap();
        fs.write("/f", b"on disk", 0).unwrap();
        dump_to_dir(&fs, &dir).unwrap();
        assert!(exists_in_dir(&dir));

        let mut restored = restore_from_dir(config, &dir, Box::new(Identity)).unwrap();
        assert_eq!(restored.get_attributes("/f").unwrap().mode.bits(), 0o100640);
        assert_eq!(restored.read("/f", 64, 0), b"on disk");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_restore_from_empty_dir_creates_nothing() {
        let dir = std::env::temp_dir().join(format!("flatfs-empty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let result = restore_from_dir(small_config(), &dir, Box::new(Identity));
        assert!(matches!(result, Err(FlatfsError::Io(_))));
        assert!(!dir.join(STRUCTURE_FILE).exists());
        assert!(!dir.join(BLOCKS_FILE).exists());
        assert!(!exists_in_dir(&dir));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
