//! End-to-end file system scenarios over in-process block servers.

use stripefs_client::{BlockClient, FileSystem, FsError, transport::memory::MemoryServer};
use stripefs_types::{DIR_ENTRY_SIZE, FsConfig, InodeNo, InodeType};

const ROOT: InodeNo = InodeNo::ROOT;

fn servers(cfg: &FsConfig) -> Vec<MemoryServer> {
    (0..cfg.n_servers)
        .map(|_| MemoryServer::new(cfg.blocks_per_server(), cfg.block_size))
        .collect()
}

fn client(cfg: &FsConfig, id: u8, srv: &[MemoryServer]) -> FileSystem<MemoryServer> {
    FileSystem::new(BlockClient::new(*cfg, id, srv.to_vec()))
}

/// One client on a fresh set of servers, root directory bootstrapped.
fn new_fs() -> FileSystem<MemoryServer> {
    let cfg = FsConfig::default();
    let srv = servers(&cfg);
    let mut fs = client(&cfg, 0, &srv);
    fs.init_root();
    fs
}

#[test]
fn root_starts_with_dot_only() {
    let mut fs = new_fs();
    let root = fs.load_inode(ROOT);
    assert_eq!(root.ty, InodeType::Dir);
    assert_eq!(root.refcnt, 1);
    assert_eq!(root.size as usize, DIR_ENTRY_SIZE);
    assert_eq!(fs.resolve_path(".", ROOT), Some(ROOT));
    assert_eq!(fs.resolve_path("/", ROOT), Some(ROOT));
}

#[test]
fn mkdir_cd_create_append_cat() {
    let mut fs = new_fs();

    let a = fs.create(ROOT, "a", InodeType::Dir).unwrap();
    assert_eq!(fs.resolve_path("a", ROOT), Some(a));
    assert_eq!(fs.resolve_path(".", a), Some(a));
    assert_eq!(fs.resolve_path("..", a), Some(ROOT));

    let f = fs.create(a, "f", InodeType::File).unwrap();
    fs.write(f, 0, b"hello").unwrap();
    let found = fs.resolve_path("f", a).unwrap();
    assert_eq!(found, f);
    let max = fs.config().max_file_size();
    assert_eq!(fs.read(found, 0, max).unwrap(), b"hello");

    // the same file is reachable absolutely
    assert_eq!(fs.resolve_path("/a/f", ROOT), Some(f));
}

#[test]
fn write_read_round_trips_across_blocks() {
    let mut fs = new_fs();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();
    let max = fs.config().max_file_size();

    for len in [1, 127, 128, 129, 200, max] {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        assert_eq!(fs.write(f, 0, &data).unwrap(), len);
        assert_eq!(fs.read(f, 0, max).unwrap(), data, "len {len}");
    }
}

#[test]
fn append_extends_the_file() {
    let mut fs = new_fs();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();
    fs.write(f, 0, b"hello ").unwrap();
    let size = fs.load_inode(f).size as usize;
    fs.write(f, size, b"world").unwrap();
    assert_eq!(fs.read(f, 0, 256).unwrap(), b"hello world");
}

#[test]
fn slice_keeps_exactly_the_requested_range() {
    let mut fs = new_fs();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();
    fs.write(f, 0, b"abcdef").unwrap();

    assert_eq!(fs.slice(f, 2, 2).unwrap(), 2);
    assert_eq!(fs.load_inode(f).size, 2);
    assert_eq!(fs.read(f, 0, 256).unwrap(), b"cd");
}

#[test]
fn slice_bounds_are_checked() {
    let mut fs = new_fs();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();
    fs.write(f, 0, b"abcdef").unwrap();

    assert_eq!(fs.slice(f, 7, 0), Err(FsError::SliceOffsetOutOfBounds));
    assert_eq!(fs.slice(f, 2, 5), Err(FsError::SliceCountOutOfBounds));
}

#[test]
fn mirror_reverses_and_is_an_involution() {
    let mut fs = new_fs();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();

    fs.write(f, 0, b"abc").unwrap();
    fs.mirror(f).unwrap();
    assert_eq!(fs.read(f, 0, 256).unwrap(), b"cba");

    // a multi-block file mirrors back to itself
    let data: Vec<u8> = (0..200u16).map(|i| (i % 256) as u8).collect();
    fs.write(f, 0, &data).unwrap();
    fs.mirror(f).unwrap();
    fs.mirror(f).unwrap();
    assert_eq!(fs.read(f, 0, 256).unwrap(), data);
}

#[test]
fn hard_link_keeps_the_file_alive() {
    let mut fs = new_fs();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();
    fs.write(f, 0, b"shared").unwrap();

    fs.link("f", "g", ROOT).unwrap();
    assert_eq!(fs.load_inode(f).refcnt, 2);

    fs.unlink(ROOT, "f").unwrap();
    let g = fs.resolve_path("g", ROOT).unwrap();
    assert_eq!(g, f);
    let inode = fs.load_inode(g);
    assert_eq!(inode.ty, InodeType::File);
    assert_eq!(inode.refcnt, 1);
    assert_eq!(fs.read(g, 0, 256).unwrap(), b"shared");
}

#[test]
fn symlink_does_not_keep_the_target_alive() {
    let mut fs = new_fs();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();
    fs.write(f, 0, b"data").unwrap();

    fs.symlink("f", "g", ROOT).unwrap();
    assert_eq!(fs.resolve_path("g", ROOT), Some(f));

    fs.unlink(ROOT, "f").unwrap();
    // the link still resolves as a name, but its target is gone
    assert_eq!(fs.resolve_path("g", ROOT), None);
}

#[test]
fn symlink_to_a_directory_resolves() {
    let mut fs = new_fs();
    let a = fs.create(ROOT, "a", InodeType::Dir).unwrap();
    fs.symlink("a", "s", ROOT).unwrap();
    assert_eq!(fs.resolve_path("s", ROOT), Some(a));
}

#[test]
fn unlink_compacts_the_directory_table() {
    let mut fs = new_fs();
    let d = fs.create(ROOT, "d", InodeType::Dir).unwrap();

    // ".", ".." plus seven files spills the table into a second block
    let files: Vec<(String, InodeNo)> = (1..=7)
        .map(|i| {
            let name = format!("f{i}");
            let n = fs.create(d, &name, InodeType::File).unwrap();
            (name, n)
        })
        .collect();
    let dir = fs.load_inode(d);
    assert_eq!(dir.size as usize, 9 * DIR_ENTRY_SIZE);
    assert!(dir.blocks[1].is_some(), "second directory block allocated");

    fs.unlink(d, "f1").unwrap();

    let dir = fs.load_inode(d);
    assert_eq!(dir.size as usize, 8 * DIR_ENTRY_SIZE);
    assert_eq!(dir.size as usize % DIR_ENTRY_SIZE, 0);
    assert_eq!(fs.dir_lookup(d, b"f1"), None);
    // the entry that lived in the second block slid into the first
    for (name, n) in &files[1..] {
        assert_eq!(fs.dir_lookup(d, name.as_bytes()), Some(*n), "{name}");
    }
    // one reference per surviving entry created here, plus its own
    assert_eq!(fs.load_inode(d).refcnt, 7);
}

#[test]
fn unlink_returns_data_blocks_to_the_bitmap() {
    let mut fs = new_fs();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();
    fs.write(f, 0, &vec![7u8; 200]).unwrap();

    let blocks: Vec<_> = fs.load_inode(f).blocks.iter().flatten().copied().collect();
    assert_eq!(blocks.len(), 2);
    let cfg = fs.config();
    for b in &blocks {
        let (bitmap_block, byte) = cfg.bitmap_slot(*b);
        assert_eq!(fs.store().get(bitmap_block)[byte], 1);
    }

    fs.unlink(ROOT, "f").unwrap();

    assert_eq!(fs.load_inode(f).ty, InodeType::Invalid);
    for b in &blocks {
        let (bitmap_block, byte) = cfg.bitmap_slot(*b);
        assert_eq!(fs.store().get(bitmap_block)[byte], 0);
    }
    // the freed blocks are immediately reusable
    let g = fs.create(ROOT, "g", InodeType::File).unwrap();
    fs.write(g, 0, b"x").unwrap();
    assert_eq!(fs.load_inode(g).blocks[0], Some(blocks[0]));
}

#[test]
fn create_error_cases() {
    let mut fs = new_fs();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();

    assert_eq!(
        fs.create(ROOT, "x", InodeType::Invalid),
        Err(FsError::CreateInvalidType)
    );
    assert_eq!(
        fs.create(ROOT, "x", InodeType::Sym),
        Err(FsError::CreateInvalidType)
    );
    assert_eq!(
        fs.create(f, "x", InodeType::File),
        Err(FsError::CreateInvalidDir)
    );
    assert_eq!(
        fs.create(ROOT, "f", InodeType::File),
        Err(FsError::CreateAlreadyExists)
    );

    // 16 inodes: root and f leave room for 14 more
    for i in 0..14 {
        fs.create(ROOT, &format!("g{i}"), InodeType::File).unwrap();
    }
    assert_eq!(
        fs.create(ROOT, "overflow", InodeType::File),
        Err(FsError::CreateInodeNotAvailable)
    );
}

#[test]
fn full_directory_rejects_new_entries() {
    let mut fs = new_fs();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();

    // root holds ".", "f" and 14 hard links: 16 entries fill both blocks
    for i in 0..14 {
        fs.link("f", &format!("g{i}"), ROOT).unwrap();
    }
    assert_eq!(fs.load_inode(ROOT).size as usize, fs.config().max_file_size());
    assert_eq!(fs.load_inode(f).refcnt, 15);

    assert_eq!(
        fs.create(ROOT, "x", InodeType::File),
        Err(FsError::CreateDataBlockNotAvailable)
    );
    assert_eq!(fs.link("f", "x", ROOT), Err(FsError::LinkDataBlockNotAvailable));
    assert_eq!(
        fs.symlink("f", "x", ROOT),
        Err(FsError::SymlinkDataBlockNotAvailable)
    );
}

#[test]
fn read_write_error_cases() {
    let mut fs = new_fs();
    let d = fs.create(ROOT, "d", InodeType::Dir).unwrap();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();
    fs.write(f, 0, b"abc").unwrap();
    let max = fs.config().max_file_size();

    assert_eq!(fs.write(d, 0, b"x"), Err(FsError::WriteNotFile));
    assert_eq!(fs.write(f, 4, b"x"), Err(FsError::WriteOffsetLargerThanSize));
    assert_eq!(
        fs.write(f, 1, &vec![0; max]),
        Err(FsError::WriteExceedsFileSize)
    );
    assert_eq!(fs.read(d, 0, 1), Err(FsError::ReadNotFile));
    assert_eq!(fs.read(f, 4, 1), Err(FsError::ReadOffsetLargerThanSize));
    // reading past the end just clamps
    assert_eq!(fs.read(f, 0, 999).unwrap(), b"abc");
    assert_eq!(fs.read(f, 3, 10).unwrap(), b"");
}

#[test]
fn unlink_error_cases() {
    let mut fs = new_fs();
    let d = fs.create(ROOT, "d", InodeType::Dir).unwrap();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();

    assert_eq!(fs.unlink(f, "x"), Err(FsError::UnlinkInvalidDir));
    assert_eq!(fs.unlink(ROOT, "missing"), Err(FsError::UnlinkDoesNotExist));
    assert_eq!(fs.unlink(ROOT, "d"), Err(FsError::UnlinkNotFile));
    let _ = d;
}

#[test]
fn link_error_cases() {
    let mut fs = new_fs();
    let d = fs.create(ROOT, "d", InodeType::Dir).unwrap();
    let f = fs.create(ROOT, "f", InodeType::File).unwrap();

    assert_eq!(
        fs.link("missing", "x", ROOT),
        Err(FsError::LinkTargetDoesNotExist)
    );
    assert_eq!(fs.link("d", "x", ROOT), Err(FsError::LinkTargetNotFile));
    assert_eq!(fs.link("/f", "x", f), Err(FsError::LinkNotDirectory));
    assert_eq!(fs.link("f", "d", ROOT), Err(FsError::LinkAlreadyExists));
    assert_eq!(
        fs.symlink("missing", "x", ROOT),
        Err(FsError::SymlinkTargetDoesNotExist)
    );
    assert_eq!(fs.symlink("f", "d", ROOT), Err(FsError::SymlinkAlreadyExists));
}

#[test]
fn symlink_target_length_is_bounded() {
    let mut fs = new_fs();
    fs.create(ROOT, "f", InodeType::File).unwrap();

    // resolves (every "." step stays in the root) but exceeds one block
    let long_target = format!("{}f", "./".repeat(65));
    assert!(long_target.len() > fs.config().block_size);
    assert_eq!(
        fs.symlink(&long_target, "s", ROOT),
        Err(FsError::SymlinkTargetExceedsBlockSize)
    );
}

#[test]
fn symlink_needs_a_free_inode() {
    let mut fs = new_fs();
    let d = fs.create(ROOT, "d", InodeType::Dir).unwrap();
    // exhaust the inode table (root, d, 14 files) while leaving d's
    // entry table short of full
    fs.create(ROOT, "x", InodeType::File).unwrap();
    for i in 0..13 {
        fs.create(d, &format!("f{i}"), InodeType::File).unwrap();
    }
    assert_eq!(
        fs.symlink("..", "s", d),
        Err(FsError::SymlinkInodeNotAvailable)
    );
}

#[test]
fn lost_server_does_not_lose_files() {
    let cfg = FsConfig::default();
    let srv = servers(&cfg);
    let mut writer = client(&cfg, 0, &srv);
    writer.init_root();

    let f = writer.create(ROOT, "f", InodeType::File).unwrap();
    let data: Vec<u8> = (0..200u16).map(|i| (i * 3 % 256) as u8).collect();
    writer.write(f, 0, &data).unwrap();

    srv[2].kill();

    // a cold-cache client reads everything back through reconstruction
    let mut reader = client(&cfg, 1, &srv);
    reader.acquire();
    let n = reader.resolve_path("/f", ROOT).unwrap();
    assert_eq!(reader.read(n, 0, 256).unwrap(), data);
    reader.release();
}

#[test]
fn two_clients_stay_coherent_through_the_lock() {
    let cfg = FsConfig::default();
    let srv = servers(&cfg);
    let mut a = client(&cfg, 1, &srv);
    let mut b = client(&cfg, 2, &srv);

    a.acquire();
    a.init_root();
    let f = a.create(ROOT, "f", InodeType::File).unwrap();
    a.write(f, 0, b"one").unwrap();
    a.release();

    b.acquire();
    // a second client must not re-initialize the root
    b.init_root();
    let n = b.resolve_path("f", ROOT).unwrap();
    assert_eq!(b.read(n, 0, 256).unwrap(), b"one");
    b.release();

    a.acquire();
    let size = a.load_inode(f).size as usize;
    a.write(f, size, b" two").unwrap();
    a.release();

    b.acquire();
    assert_eq!(b.read(n, 0, 256).unwrap(), b"one two");
    b.release();
}

#[test]
fn directory_sizes_stay_entry_aligned() {
    let mut fs = new_fs();
    let d = fs.create(ROOT, "d", InodeType::Dir).unwrap();
    for i in 0..5 {
        fs.create(d, &format!("f{i}"), InodeType::File).unwrap();
    }
    fs.unlink(d, "f2").unwrap();
    fs.symlink("f0", "s", d).unwrap();

    for dir in [ROOT, d] {
        let inode = fs.load_inode(dir);
        assert_eq!(inode.size as usize % DIR_ENTRY_SIZE, 0);
        assert!(inode.size as usize <= fs.config().max_file_size());
    }
}

#[test]
fn list_dir_reflects_the_table() {
    let mut fs = new_fs();
    let d = fs.create(ROOT, "d", InodeType::Dir).unwrap();
    fs.create(d, "f", InodeType::File).unwrap();

    let entries = fs.list_dir(d).unwrap();
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, [".", "..", "f"]);
    assert_eq!(entries[0].1, d);
    assert_eq!(entries[1].1, ROOT);

    let f = fs.dir_lookup(d, b"f").unwrap();
    assert!(fs.list_dir(f).is_none());
}
