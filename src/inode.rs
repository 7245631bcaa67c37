//! Inode records and the fixed-capacity table holding them.
//!
//! The table is the only record of which paths exist. There are no parent
//! links: a slot is found by comparing its full path string.

use log::debug;

use crate::{
    block::BlockStore,
    common::{FlatfsAttr, FlatfsError, FlatfsPermission, FlatfsResult, FlatfsTimeSpec},
};

/// One namespace entry. A zeroed inode is an inactive slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub active: bool,
    pub is_dir: bool,
    /// Full absolute path, unique among active inodes.
    pub path: String,
    /// Last path component, used for listings.
    pub name: String,
    pub mode: FlatfsPermission,
    pub nlink: u32,
    /// Valid bytes in the data block; always zero for directories.
    pub size: u64,
    pub atime: FlatfsTimeSpec,
    pub mtime: FlatfsTimeSpec,
    /// Data block bound to this inode, co-indexed with its slot.
    pub block: Option<usize>,
}

impl Default for Inode {
    fn default() -> Self {
        Self {
            active: false,
            is_dir: false,
            path: String::new(),
            name: String::new(),
            mode: FlatfsPermission::empty(),
            nlink: 0,
            size: 0,
            atime: FlatfsTimeSpec::default(),
            mtime: FlatfsTimeSpec::default(),
            block: None,
        }
    }
}

impl Inode {
    pub fn attr(&self, slot: usize) -> FlatfsAttr {
        FlatfsAttr {
            slot,
            mode: self.mode,
            nlink: self.nlink,
            size: self.size,
            atime: self.atime,
            mtime: self.mtime,
        }
    }
}

pub struct InodeTable {
    slots: Vec<Inode>,
}

impl InodeTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Inode::default(); capacity],
        }
    }

    pub(crate) fn from_slots(slots: Vec<Inode>) -> Self {
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, slot: usize) -> Option<&Inode> {
        self.slots.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Inode> {
        self.slots.get_mut(slot)
    }

    /// Active inode at `slot`, if any.
    pub fn active(&self, slot: usize) -> Option<&Inode> {
        self.slots.get(slot).filter(|inode| inode.active)
    }

    /// Slot of the active inode whose path is exactly `path`.
    pub fn find_by_path(&self, path: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|inode| inode.active && inode.path == path)
    }

    /// First inactive slot. The slot stays inactive until the caller fills it.
    pub fn allocate_slot(&self) -> FlatfsResult<usize> {
        match self.slots.iter().position(|inode| !inode.active) {
            Some(slot) => {
                debug!("found unused inode at slot {}", slot);
                Ok(slot)
            }
            None => Err(FlatfsError::NoFreeInode),
        }
    }

    /// Returns `slot` to the pool, zeroing the inode and its data block.
    pub fn free_slot(&mut self, slot: usize, blocks: &mut BlockStore) {
        let Some(inode) = self.slots.get_mut(slot) else {
            return;
        };
        if let Some(block) = inode.block {
            blocks.clear(block);
        }
        *inode = Inode::default();
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (usize, &Inode)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, inode)| inode.active)
    }

    pub fn active_count(&self) -> usize {
        self.iter_active().count()
    }

    pub(crate) fn slots(&self) -> &[Inode] {
        &self.slots
    }
}
