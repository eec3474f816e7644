//! The inode table.
//!
//! Inodes are fixed-size records packed into the table blocks; loading and
//! storing one is a read-modify-write of its slice of the containing
//! block.

use stripefs_types::{Inode, InodeNo, InodeType};

use super::FileSystem;
use crate::transport::BlockTransport;

impl<T: BlockTransport> FileSystem<T> {
    /// Reads inode `n` from the table.
    ///
    /// # Panics
    ///
    /// Panics if `n` is out of range; inode numbers reach this layer
    /// through directory entries or validated shell input.
    pub fn load_inode(&mut self, n: InodeNo) -> Inode {
        let cfg = self.config();
        assert!(n.as_index() < cfg.max_inodes, "inode number {n} out of range");
        let (block_no, offset) = cfg.inode_slot(n);
        let block = self.store.get(block_no);
        Inode::decode(&cfg, &block[offset..offset + cfg.inode_size])
    }

    /// Writes inode `n` back to the table.
    pub fn store_inode(&mut self, n: InodeNo, inode: &Inode) {
        let cfg = self.config();
        assert!(n.as_index() < cfg.max_inodes, "inode number {n} out of range");
        let (block_no, offset) = cfg.inode_slot(n);
        let mut block = self.store.get(block_no);
        block[offset..offset + cfg.inode_size].copy_from_slice(&inode.encode(&cfg));
        self.store.put(block_no, &block);
    }

    /// First INVALID slot in the table, if any. The table is small; a
    /// linear scan is the intended lookup.
    pub fn find_available_inode(&mut self) -> Option<InodeNo> {
        let max_inodes = self.config().max_inodes;
        (0..max_inodes)
            .map(|i| InodeNo::new(i as u32))
            .find(|&n| self.load_inode(n).ty == InodeType::Invalid)
    }
}
