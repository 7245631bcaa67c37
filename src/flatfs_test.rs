#[cfg(test)]
mod tests {
    use crate::common::{FlatfsError, FlatfsResult};
    use crate::config::FlatfsConfig;
    use crate::fs::FlatFs;
    use crate::snapshot::{self, MemStorage, SnapshotStorage};
    use crate::transform::{Identity, RandomXor};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn new_fs(capacity: usize) -> FlatFs {
        init_logger();
        let config = FlatfsConfig {
            inode_capacity: capacity,
            ..FlatfsConfig::default()
        };
        FlatFs::with_transform(config, Box::new(Identity)).expect("valid config")
    }

    /// Storage whose writes always fail.
    struct BrokenStorage;

    impl SnapshotStorage for BrokenStorage {
        fn write(&self, _offset: u64, _data: &[u8]) -> FlatfsResult<()> {
            Err(FlatfsError::Io("device gone".to_string()))
        }
        fn read(&self, _offset: u64, _buf: &mut [u8]) -> FlatfsResult<()> {
            Err(FlatfsError::Io("device gone".to_string()))
        }
        fn len(&self) -> FlatfsResult<u64> {
            Ok(0)
        }
        fn truncate(&self, _length: u64) -> FlatfsResult<()> {
            Ok(())
        }
        fn flush(&self) -> FlatfsResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_end_to_end() {
        let mut fs = new_fs(64);
        assert!(fs.get_attributes("/").unwrap().mode.is_dir());
        fs.create_file("/x", 0o644).expect("create");
        assert_eq!(fs.write("/x", b"ab", 0), Ok(2));
        assert_eq!(fs.get_attributes("/x").unwrap().size, 2);
        assert_eq!(fs.remove_file("/x"), Ok(()));
        assert_eq!(fs.get_attributes("/x"), Err(FlatfsError::NotFound));
    }

    #[test]
    fn test_never_created_is_not_found() {
        let fs = new_fs(8);
        for path in ["/nope", "/hello/x", "", "hello", "/a/b/c"] {
            assert_eq!(fs.get_attributes(path), Err(FlatfsError::NotFound));
        }
    }

    #[test]
    fn test_create_existing_leaves_inode_alone() {
        let mut fs = new_fs(8);
        fs.create_file("/f", 0o600).unwrap();
        fs.write("/f", b"keep", 0).unwrap();
        let before = fs.get_attributes("/f").unwrap();

        assert_eq!(fs.create_file("/f", 0o777), Err(FlatfsError::AlreadyExists));
        assert_eq!(fs.make_directory("/f", 0o777), Err(FlatfsError::AlreadyExists));
        assert_eq!(fs.get_attributes("/f").unwrap(), before);
        assert_eq!(fs.read("/f", 64, 0), b"keep");
    }

    #[test]
    fn test_capacity_exhaustion_and_reuse() {
        let mut fs = new_fs(5);
        // root and /hello already hold two slots
        fs.create_file("/a", 0o644).unwrap();
        fs.make_directory("/b", 0o755).unwrap();
        fs.create_file("/c", 0o644).unwrap();
        assert_eq!(fs.create_file("/d", 0o644), Err(FlatfsError::NoFreeInode));
        assert_eq!(fs.make_directory("/d", 0o755), Err(FlatfsError::NoFreeInode));

        fs.remove_file("/a").unwrap();
        assert_eq!(fs.create_file("/d", 0o644), Ok(2));
        assert_eq!(fs.create_file("/e", 0o644), Err(FlatfsError::NoFreeInode));
    }

    #[test]
    fn test_write_overwrites_and_shrinks() {
        let mut fs = new_fs(8);
        fs.create_file("/f", 0o644).unwrap();
        assert_eq!(fs.write("/f", b"hello world", 0), Ok(11));
        assert_eq!(fs.get_attributes("/f").unwrap().size, 11);
        assert_eq!(fs.write("/f", b"bye", 0), Ok(3));
        assert_eq!(fs.get_attributes("/f").unwrap().size, 3);
        assert_eq!(fs.read("/f", 4096, 0), b"bye");
    }

    #[test]
    fn test_write_too_large_keeps_size() {
        let mut fs = new_fs(8);
        let block_size = fs.config().block_size;
        fs.create_file("/f", 0o644).unwrap();
        fs.write("/f", &vec![b'a'; 100], 0).unwrap();

        let too_big = vec![b'b'; block_size - 100];
        assert_eq!(fs.write("/f", &too_big, 0), Err(FlatfsError::FileTooLarge));
        assert_eq!(fs.get_attributes("/f").unwrap().size, 100);
        assert_eq!(fs.read("/f", 4096, 0), vec![b'a'; 100]);

        // the current size counts against the block
        let fits = vec![b'c'; block_size - 101];
        assert_eq!(fs.write("/f", &fits, 0), Ok(block_size - 101));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut fs = new_fs(8);
        assert_eq!(fs.remove_file("/ghost"), Ok(()));
        assert_eq!(fs.remove_directory("/ghost"), Ok(()));
        assert_eq!(fs.get_attributes("/ghost"), Err(FlatfsError::NotFound));
        assert_eq!(fs.table().active_count(), 2);
    }

    #[test]
    fn test_listing_direct_children_only() {
        let mut fs = new_fs(8);
        fs.make_directory("/a", 0o755).unwrap();
        fs.create_file("/a/b", 0o644).unwrap();

        let root = fs.list_directory("/");
        assert_eq!(root, vec![".", "..", "hello", "a"]);
        assert!(!root.contains(&"b".to_string()));
        assert_eq!(fs.list_directory("/a"), vec![".", "..", "b"]);
    }

    #[test]
    fn test_no_parent_check_and_orphans() {
        let mut fs = new_fs(8);
        fs.create_file("/x/y/z", 0o644).unwrap();
        assert!(fs.get_attributes("/x/y").is_err());
        assert_eq!(fs.list_directory("/x/y"), vec![".", "..", "z"]);

        fs.make_directory("/d", 0o755).unwrap();
        fs.create_file("/d/f", 0o644).unwrap();
        fs.remove_directory("/d").unwrap();
        assert_eq!(fs.get_attributes("/d"), Err(FlatfsError::NotFound));
        assert!(fs.get_attributes("/d/f").is_ok());
        assert_eq!(fs.list_directory("/d"), vec![".", "..", "f"]);
    }

    #[test]
    fn test_random_reads_keep_size() {
        init_logger();
        let mut fs = FlatFs::with_transform(FlatfsConfig::default(), Box::new(RandomXor::seeded(3)))
            .unwrap();
        let plain = b"Hello World!";
        for _ in 0..2 {
            let out = fs.read("/hello", 4096, 0);
            assert_eq!(out.len(), plain.len());
            let key = out[0] ^ plain[0];
            assert!(out.iter().zip(plain.iter()).all(|(o, p)| o ^ p == key));
            assert_eq!(fs.get_attributes("/hello").unwrap().size, 12);
        }

        fs.set_transform(Box::new(Identity));
        assert_eq!(fs.read("/hello", 4096, 0), plain);
    }

    #[test]
    fn test_snapshot_restore_preserves_state() {
        let mut fs = new_fs(8);
        fs.make_directory("/docs", 0o750).unwrap();
        fs.create_file("/docs/a", 0o640).unwrap();
        fs.write("/docs/a", b"alpha", 0).unwrap();
        fs.remove_file("/hello").unwrap();

        let structure = MemStorage::new();
        let blocks = MemStorage::new();
        snapshot::dump(&fs, &structure, &blocks).unwrap();

        let mut restored =
            snapshot::restore(fs.config().clone(), &structure, &blocks, Box::new(Identity))
                .unwrap();
        assert_eq!(
            restored.get_attributes("/docs/a").unwrap(),
            fs.get_attributes("/docs/a").unwrap()
        );
        assert_eq!(restored.read("/docs/a", 64, 0), b"alpha");
        assert_eq!(restored.get_attributes("/hello"), Err(FlatfsError::NotFound));
        assert_eq!(restored.list_directory("/"), vec![".", "..", "docs"]);

        // freed slot 1 is reused first
        assert_eq!(restored.create_file("/new", 0o644), Ok(1));
    }

    #[test]
    fn test_snapshot_write_error_propagates() {
        let fs = new_fs(4);
        let blocks = MemStorage::new();
        assert_eq!(
            snapshot::dump(&fs, &BrokenStorage, &blocks),
            Err(FlatfsError::Io("device gone".to_string()))
        );
        assert!(blocks.bytes().is_empty());
    }
}
