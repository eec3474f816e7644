//! The metadata stack: inode table, free-block bitmap, directories, path
//! resolution and file operations.
//!
//! Everything here is plain block I/O through the striped store; no state
//! is kept in memory across calls. The shell brackets each command with
//! [`FileSystem::acquire`]/[`FileSystem::release`], which is what makes
//! these multi-block updates appear atomic to other clients.

use stripefs_types::FsConfig;

use crate::{store::BlockClient, transport::BlockTransport};

mod data_block;
mod directory;
mod inode;
mod ops;
mod path;

/// A client's file system, layered over its view of the block store.
pub struct FileSystem<T> {
    store: BlockClient<T>,
}

impl<T: BlockTransport> FileSystem<T> {
    pub fn new(store: BlockClient<T>) -> Self {
        Self { store }
    }

    pub fn config(&self) -> FsConfig {
        *self.store.config()
    }

    /// Direct access to the block layer, for the shell's block-inspection
    /// commands, dumps and repair.
    pub fn store(&mut self) -> &mut BlockClient<T> {
        &mut self.store
    }

    /// Enters the cross-client critical section (and revalidates the
    /// cache).
    pub fn acquire(&mut self) {
        self.store.acquire();
    }

    /// Leaves the critical section.
    pub fn release(&mut self) {
        self.store.release();
    }
}
