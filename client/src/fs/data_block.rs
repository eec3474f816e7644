//! The free-block bitmap: one byte per block, 0 free, 1 used.

use log::debug;
use stripefs_types::BlockNo;

use super::FileSystem;
use crate::transport::BlockTransport;

impl<T: BlockTransport> FileSystem<T> {
    /// Claims the first free data block and persists the bitmap.
    ///
    /// # Panics
    ///
    /// Panics when no data block is free; running a full disk out of space
    /// is unrecoverable here.
    pub fn allocate_data_block(&mut self) -> BlockNo {
        let cfg = self.config();
        // the two reserved tail blocks are never handed out
        for b in cfg.data_block_offset()..cfg.total_blocks - 2 {
            let b = BlockNo::new(b as u32);
            let (bitmap_block, byte) = cfg.bitmap_slot(b);
            let mut block = self.store.get(bitmap_block);
            if block[byte] == 0 {
                block[byte] = 1;
                self.store.put(bitmap_block, &block);
                debug!("allocated data block {b}");
                return b;
            }
        }
        panic!("no free data blocks");
    }

    /// Returns a data block to the bitmap.
    pub fn free_data_block(&mut self, b: BlockNo) {
        let (bitmap_block, byte) = self.config().bitmap_slot(b);
        let mut block = self.store.get(bitmap_block);
        assert_eq!(block[byte], 1, "freeing free block {b}");
        block[byte] = 0;
        self.store.put(bitmap_block, &block);
        debug!("freed data block {b}");
    }
}
