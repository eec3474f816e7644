use crate::repr::{BlockNo, DIR_ENTRY_SIZE, InodeNo};

/// Maximum file name length in bytes. Never changeable: directory entries
/// are sized around it on disk.
pub const MAX_FILENAME: usize = 12;

/// Bytes spent on the inode number in a directory entry. Never changeable.
pub const INODE_NUMBER_SIZE: usize = 4;

/// Bytes spent on the `size`/`type`/`refcnt` header of an inode record.
pub const INODE_HEADER_SIZE: usize = 8;

/// Client ids live in `0..MAX_CLIENTS`; the id is stamped into the first
/// byte of the last-writer block.
pub const MAX_CLIENTS: u8 = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("total blocks ({0}) must be a positive multiple of the block size")]
    TotalBlocks(usize),
    #[error("block size ({0}) must be a positive multiple of the inode size")]
    BlockSize(usize),
    #[error("inode size ({inode_size}) must be at least {min} bytes")]
    InodeSize { inode_size: usize, min: usize },
    #[error("inode table ({0} inodes) must fill whole blocks")]
    InodeTable(usize),
    #[error("block size ({0}) must be a multiple of the directory entry width")]
    BlockEntryAlignment(usize),
    #[error("layout needs {needed} blocks but only {total} are configured")]
    LayoutOverflow { needed: usize, total: usize },
    #[error("server count ({0}) must be between 1 and 8")]
    ServerCount(usize),
}

/// File system geometry, fixed at process start and identical on every
/// client that shares a set of block servers.
///
/// Everything else about the layout is derived from these five numbers plus
/// the frozen constants above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    pub total_blocks: usize,
    pub block_size: usize,
    pub max_inodes: usize,
    pub inode_size: usize,
    pub n_servers: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            total_blocks: 256,
            block_size: 128,
            max_inodes: 16,
            inode_size: 16,
            n_servers: 4,
        }
    }
}

impl FsConfig {
    pub fn new(
        total_blocks: usize,
        block_size: usize,
        max_inodes: usize,
        inode_size: usize,
        n_servers: usize,
    ) -> Result<Self, ConfigError> {
        let cfg = Self {
            total_blocks,
            block_size,
            max_inodes,
            inode_size,
            n_servers,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.total_blocks == 0 || self.total_blocks % self.block_size != 0 {
            return Err(ConfigError::TotalBlocks(self.total_blocks));
        }
        let min = INODE_HEADER_SIZE + INODE_NUMBER_SIZE;
        if self.inode_size < min {
            return Err(ConfigError::InodeSize {
                inode_size: self.inode_size,
                min,
            });
        }
        if self.block_size == 0 || self.block_size % self.inode_size != 0 {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        if self.max_inodes == 0 || (self.max_inodes * self.inode_size) % self.block_size != 0 {
            return Err(ConfigError::InodeTable(self.max_inodes));
        }
        // directory entries must tile blocks exactly; they never straddle
        // a block boundary
        if self.block_size < DIR_ENTRY_SIZE || self.block_size % DIR_ENTRY_SIZE != 0 {
            return Err(ConfigError::BlockEntryAlignment(self.block_size));
        }
        if !(1..=usize::from(MAX_CLIENTS)).contains(&self.n_servers) {
            return Err(ConfigError::ServerCount(self.n_servers));
        }
        // boot + super + bitmap + inode table + the two reserved tail blocks,
        // and at least one data block
        let needed = self.data_block_offset() + 3;
        if needed > self.total_blocks {
            return Err(ConfigError::LayoutOverflow {
                needed,
                total: self.total_blocks,
            });
        }
        Ok(())
    }

    pub fn inodes_per_block(&self) -> usize {
        self.block_size / self.inode_size
    }

    /// Blocks spent on the free bitmap (one byte per block).
    pub fn bitmap_blocks(&self) -> usize {
        self.total_blocks / self.block_size
    }

    /// First block of the free bitmap. Blocks 0 and 1 are boot and super.
    pub fn bitmap_block_offset(&self) -> usize {
        2
    }

    pub fn inode_block_offset(&self) -> usize {
        self.bitmap_block_offset() + self.bitmap_blocks()
    }

    pub fn inode_blocks(&self) -> usize {
        self.max_inodes * self.inode_size / self.block_size
    }

    pub fn data_block_offset(&self) -> usize {
        self.inode_block_offset() + self.inode_blocks()
    }

    /// Direct block slots in one inode record.
    pub fn max_blocks_per_file(&self) -> usize {
        (self.inode_size - INODE_HEADER_SIZE) / INODE_NUMBER_SIZE
    }

    pub fn max_file_size(&self) -> usize {
        self.max_blocks_per_file() * self.block_size
    }

    pub fn entries_per_block(&self) -> usize {
        self.block_size / DIR_ENTRY_SIZE
    }

    /// Block stamped with the id of the last mutating client.
    pub fn last_writer_block(&self) -> BlockNo {
        BlockNo::new(self.total_blocks as u32 - 2)
    }

    /// Block carrying the cross-client spinlock.
    pub fn lock_block(&self) -> BlockNo {
        BlockNo::new(self.total_blocks as u32 - 1)
    }

    /// The last-writer and lock blocks bypass the cache and are never
    /// stamped themselves.
    pub fn is_reserved(&self, b: BlockNo) -> bool {
        b == self.last_writer_block() || b == self.lock_block()
    }

    /// Per-server raw slot count. Each stripe of `n_servers - 1` data blocks
    /// occupies one slot per server; a trailing partial stripe still needs a
    /// full level.
    pub fn blocks_per_server(&self) -> usize {
        if self.n_servers == 1 {
            self.total_blocks
        } else {
            self.total_blocks.div_ceil(self.n_servers - 1)
        }
    }

    /// Bitmap block holding the free/used byte for `b`, plus the byte's
    /// offset inside that block.
    pub fn bitmap_slot(&self, b: BlockNo) -> (BlockNo, usize) {
        let block = self.bitmap_block_offset() + b.as_index() / self.block_size;
        (BlockNo::new(block as u32), b.as_index() % self.block_size)
    }

    /// Inode-table block holding inode `n`, plus the record's byte range
    /// inside that block.
    pub fn inode_slot(&self, n: InodeNo) -> (BlockNo, usize) {
        let byte = n.as_index() * self.inode_size;
        let block = self.inode_block_offset() + byte / self.block_size;
        (BlockNo::new(block as u32), byte % self.block_size)
    }

    /// Self-describing tag written at the head of a dump file. Loading a
    /// dump produced under different geometry is refused.
    pub fn dump_tag(&self) -> String {
        format!(
            "BS_{}_NB_{}_IS_{}_MI_{}_MF_{}_IDS_{}",
            self.block_size,
            self.total_blocks,
            self.inode_size,
            self.max_inodes,
            MAX_FILENAME,
            INODE_NUMBER_SIZE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let cfg = FsConfig::default();
        assert_eq!(cfg.inodes_per_block(), 8);
        assert_eq!(cfg.bitmap_blocks(), 2);
        assert_eq!(cfg.inode_block_offset(), 4);
        assert_eq!(cfg.inode_blocks(), 2);
        assert_eq!(cfg.data_block_offset(), 6);
        assert_eq!(cfg.max_blocks_per_file(), 2);
        assert_eq!(cfg.max_file_size(), 256);
        assert_eq!(cfg.entries_per_block(), 8);
        assert_eq!(cfg.last_writer_block(), BlockNo::new(254));
        assert_eq!(cfg.lock_block(), BlockNo::new(255));
        // 256 logical blocks over 3 data positions: the tail block sits on
        // level 85, so every server carries 86 slots.
        assert_eq!(cfg.blocks_per_server(), 86);
    }

    #[test]
    fn dump_tag_matches_geometry() {
        let cfg = FsConfig::default();
        assert_eq!(cfg.dump_tag(), "BS_128_NB_256_IS_16_MI_16_MF_12_IDS_4");
    }

    #[test]
    fn slot_arithmetic() {
        let cfg = FsConfig::default();
        // inode 9 at 16 bytes each: second table block, second record
        assert_eq!(cfg.inode_slot(InodeNo::new(9)), (BlockNo::new(5), 16));
        // bitmap byte for block 200 lives in the second bitmap block
        assert_eq!(cfg.bitmap_slot(BlockNo::new(200)), (BlockNo::new(3), 72));
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(FsConfig::new(255, 128, 16, 16, 4).is_err());
        assert!(FsConfig::new(256, 100, 16, 16, 4).is_err());
        assert!(FsConfig::new(256, 128, 16, 8, 4).is_err());
        assert!(FsConfig::new(256, 128, 16, 16, 0).is_err());
        assert!(FsConfig::new(256, 128, 16, 16, 9).is_err());
    }

    #[test]
    fn single_server_degenerates() {
        let cfg = FsConfig::new(256, 128, 16, 16, 1).unwrap();
        assert_eq!(cfg.blocks_per_server(), 256);
    }
}
