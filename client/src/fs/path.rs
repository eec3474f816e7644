//! Path resolution and link creation.
//!
//! Paths are walked iteratively, one `/`-separated component at a time;
//! absolute paths start at the root inode, relative paths at the caller's
//! working directory. Resolution dereferences a symbolic link once; a
//! symlink's target may itself name a symlink, but chains are not
//! followed.

use stripefs_types::{Inode, InodeNo, InodeType};

use super::FileSystem;
use crate::{error::FsError, transport::BlockTransport};

impl<T: BlockTransport> FileSystem<T> {
    /// Walks `path` component by component starting from `dir`.
    pub fn path_to_inode(&mut self, path: &str, dir: InodeNo) -> Option<InodeNo> {
        let mut cur = dir;
        for part in path.split('/') {
            cur = self.dir_lookup(cur, part.as_bytes())?;
        }
        Some(cur)
    }

    /// Absolute paths walk from the root ("/" alone names the root
    /// itself), everything else from `cwd`.
    pub fn general_path_to_inode(&mut self, path: &str, cwd: InodeNo) -> Option<InodeNo> {
        match path.strip_prefix('/') {
            Some("") => Some(InodeNo::ROOT),
            Some(rest) => self.path_to_inode(rest, InodeNo::ROOT),
            None if path.is_empty() => None,
            None => self.path_to_inode(path, cwd),
        }
    }

    /// Resolves `path`, following a symbolic link at the end one level.
    pub fn resolve_path(&mut self, path: &str, cwd: InodeNo) -> Option<InodeNo> {
        let n = self.general_path_to_inode(path, cwd)?;
        let inode = self.load_inode(n);
        if inode.ty != InodeType::Sym {
            return Some(n);
        }
        let target = self.read_symlink_target(&inode);
        self.general_path_to_inode(&target, cwd)
    }

    /// A symlink stores its target string in its first data block; the
    /// inode's size is the string length.
    pub(super) fn read_symlink_target(&mut self, inode: &Inode) -> String {
        let block_no = inode.blocks[0].expect("symlink data block missing");
        let block = self.store.get(block_no);
        String::from_utf8_lossy(&block[..inode.size as usize]).into_owned()
    }

    /// The target string of the symlink at `n`, or `None` for any other
    /// inode type.
    pub fn symlink_target(&mut self, n: InodeNo) -> Option<String> {
        let inode = self.load_inode(n);
        (inode.ty == InodeType::Sym).then(|| self.read_symlink_target(&inode))
    }

    /// Creates a hard link `name` in `cwd` to the file at `target`.
    ///
    /// The target is resolved through symlinks and must be a FILE; both
    /// the target's and the directory's reference counts grow by one.
    pub fn link(&mut self, target: &str, name: &str, cwd: InodeNo) -> Result<(), FsError> {
        let target_no = self
            .resolve_path(target, cwd)
            .ok_or(FsError::LinkTargetDoesNotExist)?;

        let mut cwd_inode = self.load_inode(cwd);
        if cwd_inode.ty != InodeType::Dir {
            return Err(FsError::LinkNotDirectory);
        }
        if self.find_available_entry(cwd).is_none() {
            return Err(FsError::LinkDataBlockNotAvailable);
        }
        if self.dir_lookup(cwd, name.as_bytes()).is_some() {
            return Err(FsError::LinkAlreadyExists);
        }
        let mut target_inode = self.load_inode(target_no);
        if target_inode.ty != InodeType::File {
            return Err(FsError::LinkTargetNotFile);
        }

        self.insert_entry(cwd, &mut cwd_inode, name.as_bytes(), target_no);

        target_inode.refcnt += 1;
        self.store_inode(target_no, &target_inode);
        cwd_inode.refcnt += 1;
        self.store_inode(cwd, &cwd_inode);
        Ok(())
    }

    /// Creates a symbolic link `name` in `cwd` whose target string is
    /// `target`.
    ///
    /// The target must resolve at creation time. The link consumes one
    /// inode and one data block; it does not keep its target alive.
    pub fn symlink(&mut self, target: &str, name: &str, cwd: InodeNo) -> Result<(), FsError> {
        self.resolve_path(target, cwd)
            .ok_or(FsError::SymlinkTargetDoesNotExist)?;

        let mut cwd_inode = self.load_inode(cwd);
        if cwd_inode.ty != InodeType::Dir {
            return Err(FsError::SymlinkNotDirectory);
        }
        if self.find_available_entry(cwd).is_none() {
            return Err(FsError::SymlinkDataBlockNotAvailable);
        }
        if self.dir_lookup(cwd, name.as_bytes()).is_some() {
            return Err(FsError::SymlinkAlreadyExists);
        }
        let new_no = self
            .find_available_inode()
            .ok_or(FsError::SymlinkInodeNotAvailable)?;

        let cfg = self.config();
        if target.len() > cfg.block_size {
            return Err(FsError::SymlinkTargetExceedsBlockSize);
        }

        let data_block = self.allocate_data_block();
        let mut sym = Inode::empty(&cfg);
        sym.ty = InodeType::Sym;
        sym.size = target.len() as u32;
        sym.refcnt = 1;
        sym.blocks[0] = Some(data_block);
        self.store_inode(new_no, &sym);

        self.insert_entry(cwd, &mut cwd_inode, name.as_bytes(), new_no);

        let mut block = self.store.get(data_block);
        block[..target.len()].copy_from_slice(target.as_bytes());
        self.store.put(data_block, &block);

        cwd_inode.refcnt += 1;
        self.store_inode(cwd, &cwd_inode);
        Ok(())
    }
}
