//! Directories: dense tables of fixed-width (name, inode) entries inside
//! ordinary data blocks.
//!
//! A directory inode's `size` is the byte length of its entry table; new
//! entries are appended at `size`, and the table grows a data block
//! whenever the append crosses a block boundary.

use dataview::PodMethods as _;
use stripefs_types::{DIR_ENTRY_SIZE, DirEntry, Inode, InodeNo, InodeType, MAX_FILENAME};

use super::FileSystem;
use crate::transport::BlockTransport;

impl<T: BlockTransport> FileSystem<T> {
    /// The entry at byte offset `offset` of `dir`'s table.
    pub(super) fn dir_entry_at(&mut self, dir: &Inode, offset: usize) -> DirEntry {
        let cfg = self.config();
        let block_no = dir.blocks[offset / cfg.block_size].expect("directory data block missing");
        let block = self.store.get(block_no);
        let mut de = DirEntry::zeroed();
        let start = offset % cfg.block_size;
        de.as_bytes_mut()
            .copy_from_slice(&block[start..start + DIR_ENTRY_SIZE]);
        de
    }

    /// Scans `dir` for `name`. Returns `None` when `dir` is not a
    /// directory or holds no such entry.
    pub fn dir_lookup(&mut self, dir: InodeNo, name: &[u8]) -> Option<InodeNo> {
        let inode = self.load_inode(dir);
        if inode.ty != InodeType::Dir {
            return None;
        }
        let mut offset = 0;
        while offset < inode.size as usize {
            let de = self.dir_entry_at(&inode, offset);
            if de.is_name(name) {
                return Some(de.ino());
            }
            offset += DIR_ENTRY_SIZE;
        }
        None
    }

    /// Every entry of `dir` in table order, or `None` when `dir` is not a
    /// directory.
    pub fn list_dir(&mut self, dir: InodeNo) -> Option<Vec<(String, InodeNo)>> {
        let inode = self.load_inode(dir);
        if inode.ty != InodeType::Dir {
            return None;
        }
        let mut entries = Vec::with_capacity(inode.size as usize / DIR_ENTRY_SIZE);
        let mut offset = 0;
        while offset < inode.size as usize {
            let de = self.dir_entry_at(&inode, offset);
            entries.push((String::from_utf8_lossy(de.name()).into_owned(), de.ino()));
            offset += DIR_ENTRY_SIZE;
        }
        Some(entries)
    }

    /// Byte offset where the next entry of `dir` would land, or `None`
    /// when the table has hit the maximum file size.
    pub fn find_available_entry(&mut self, dir: InodeNo) -> Option<usize> {
        let inode = self.load_inode(dir);
        let size = inode.size as usize;
        (size < self.config().max_file_size()).then_some(size)
    }

    /// Appends a (name, inode) binding to `dir`'s table and persists the
    /// updated directory inode.
    ///
    /// The caller passes its in-memory copy of the directory inode so that
    /// later refcnt updates continue from the same state.
    ///
    /// # Panics
    ///
    /// Panics on a name longer than [`MAX_FILENAME`], a non-directory
    /// inode, or a full table; callers validate all three first.
    pub fn insert_entry(&mut self, dir_no: InodeNo, dir: &mut Inode, name: &[u8], child: InodeNo) {
        let cfg = self.config();
        assert!(name.len() <= MAX_FILENAME, "file name exceeds maximum");
        assert_eq!(dir.ty, InodeType::Dir, "not a directory inode");

        let index = dir.size as usize;
        assert!(index < cfg.max_file_size(), "no space for another entry");

        // crossing into a fresh block needs an allocation; index 0 is
        // covered by the block every directory gets at creation
        let block_index = index / cfg.block_size;
        if index % cfg.block_size == 0 && index != 0 {
            dir.blocks[block_index] = Some(self.allocate_data_block());
        }

        let block_no = dir.blocks[block_index].expect("directory data block missing");
        let mut block = self.store.get(block_no);
        let start = index % cfg.block_size;
        block[start..start + DIR_ENTRY_SIZE].copy_from_slice(DirEntry::new(name, child).as_bytes());
        self.store.put(block_no, &block);

        dir.size += DIR_ENTRY_SIZE as u32;
        self.store_inode(dir_no, dir);
    }

    /// Bootstraps the root directory (inode 0) if no client has done so
    /// yet: type DIR, refcnt 1, one data block, a "." entry for itself.
    pub fn init_root(&mut self) {
        if self.load_inode(InodeNo::ROOT).ty == InodeType::Dir {
            return;
        }
        let cfg = self.config();
        let mut root = Inode::empty(&cfg);
        root.ty = InodeType::Dir;
        root.refcnt = 1;
        root.blocks[0] = Some(self.allocate_data_block());
        self.store_inode(InodeNo::ROOT, &root);
        self.insert_entry(InodeNo::ROOT, &mut root, b".", InodeNo::ROOT);
    }
}
