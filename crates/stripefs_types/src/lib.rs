//! Data types for the stripefs on-disk format.
//!
//! The logical block layout:
//!
//! | block no.          | # of blocks           | content           |
//! |--------------------|-----------------------|-------------------|
//! | 0                  | 1                     | boot (unused)     |
//! | 1                  | 1                     | super (unused)    |
//! | 2                  | `cfg.bitmap_blocks()` | free-block bitmap |
//! | `inode offset`     | `cfg.inode_blocks()`  | inode table       |
//! | `data offset`      | rest                  | data blocks       |
//! | `cfg.total - 2`    | 1                     | last-writer stamp |
//! | `cfg.total - 1`    | 1                     | lock block        |
//!
//! The bitmap spends a whole byte per block (0 = free, 1 = used) so that the
//! allocator never needs bit twiddling. All multi-byte on-disk integers are
//! big-endian.

pub use self::{
    config::{ConfigError, FsConfig, INODE_HEADER_SIZE, INODE_NUMBER_SIZE, MAX_CLIENTS,
             MAX_FILENAME},
    repr::{BlockNo, DIR_ENTRY_SIZE, DirEntry, Inode, InodeNo, InodeType},
};

mod config;
mod repr;
