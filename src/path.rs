//! Path string helpers.
//!
//! Parent/child relations are recomputed from path strings on every call,
//! never stored.

use crate::inode::InodeTable;

pub const SEPARATOR: char = '/';
pub const ROOT: &str = "/";

/// Substring after the last separator, or the whole path if there is none.
pub fn file_name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// `dir` and `name` joined by a single separator.
pub fn join(dir: &str, name: &str) -> String {
    let mut joined = String::with_capacity(dir.len() + name.len() + 1);
    joined.push_str(dir);
    if !dir.ends_with(SEPARATOR) {
        joined.push(SEPARATOR);
    }
    joined.push_str(name);
    joined
}

/// Path with the last component stripped; the root is its own parent.
pub fn parent(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(0) | None => ROOT,
        Some(idx) => &path[..idx],
    }
}

/// Whether an inode stored at `path` under `name` sits directly below `dir`.
pub fn is_direct_child(dir: &str, path: &str, name: &str) -> bool {
    path.starts_with(dir) && path != dir && join(dir, name) == path
}

/// Names of the active inodes directly below `dir`, in slot order.
///
/// `dir` itself need not exist: entries left behind by a removed directory
/// are still listed under its path.
pub fn list_children(table: &InodeTable, dir: &str) -> Vec<String> {
    table
        .iter_active()
        .filter(|(_, inode)| is_direct_child(dir, &inode.path, &inode.name))
        .map(|(_, inode)| inode.name.clone())
        .collect()
}
