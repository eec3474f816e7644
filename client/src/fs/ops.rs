//! File operations: the calls the shell dispatches to between acquire and
//! release.

use dataview::PodMethods as _;
use stripefs_types::{BlockNo, DIR_ENTRY_SIZE, Inode, InodeNo, InodeType};

use super::FileSystem;
use crate::{error::FsError, transport::BlockTransport};

impl<T: BlockTransport> FileSystem<T> {
    /// Creates a file or directory named `name` inside `dir` and returns
    /// its inode number.
    ///
    /// A new directory gets one data block and "." / ".." entries; a new
    /// file gets no blocks until the first write. Either way the parent
    /// gains a directory entry and a reference.
    pub fn create(&mut self, dir: InodeNo, name: &str, ty: InodeType) -> Result<InodeNo, FsError> {
        if !matches!(ty, InodeType::File | InodeType::Dir) {
            return Err(FsError::CreateInvalidType);
        }
        let new_no = self
            .find_available_inode()
            .ok_or(FsError::CreateInodeNotAvailable)?;
        let mut dir_inode = self.load_inode(dir);
        if dir_inode.ty != InodeType::Dir {
            return Err(FsError::CreateInvalidDir);
        }
        if self.find_available_entry(dir).is_none() {
            return Err(FsError::CreateDataBlockNotAvailable);
        }
        if self.dir_lookup(dir, name.as_bytes()).is_some() {
            return Err(FsError::CreateAlreadyExists);
        }

        let cfg = self.config();
        let mut new_inode = Inode::empty(&cfg);
        new_inode.ty = ty;
        new_inode.refcnt = 1;

        if ty == InodeType::Dir {
            new_inode.blocks[0] = Some(self.allocate_data_block());
            self.store_inode(new_no, &new_inode);
            self.insert_entry(dir, &mut dir_inode, name.as_bytes(), new_no);
            self.insert_entry(new_no, &mut new_inode, b".", new_no);
            self.insert_entry(new_no, &mut new_inode, b"..", dir);
        } else {
            self.store_inode(new_no, &new_inode);
            self.insert_entry(dir, &mut dir_inode, name.as_bytes(), new_no);
        }

        dir_inode.refcnt += 1;
        self.store_inode(dir, &dir_inode);
        Ok(new_no)
    }

    /// Writes `data` into the file at byte `offset`, allocating data
    /// blocks on demand, and returns the byte count written.
    ///
    /// `offset` may be at most the current size (no holes). Afterwards the
    /// file's size is exactly `offset + written`: appends grow the file,
    /// and an in-place overwrite ending short of the old size also ends
    /// the file there, even though later blocks keep their bytes.
    pub fn write(&mut self, n: InodeNo, offset: usize, data: &[u8]) -> Result<usize, FsError> {
        let cfg = self.config();
        let mut inode = self.load_inode(n);
        if inode.ty != InodeType::File {
            return Err(FsError::WriteNotFile);
        }
        if offset > inode.size as usize {
            return Err(FsError::WriteOffsetLargerThanSize);
        }
        if offset + data.len() > cfg.max_file_size() {
            return Err(FsError::WriteExceedsFileSize);
        }

        let mut current = offset;
        let mut written = 0;
        while written < data.len() {
            let block_index = current / cfg.block_size;
            let next_boundary = (block_index + 1) * cfg.block_size;

            // the sub-range of this block the write covers
            let start = current % cfg.block_size;
            let end = if offset + data.len() >= next_boundary {
                cfg.block_size
            } else {
                (offset + data.len()) % cfg.block_size
            };

            let block_no = match inode.blocks[block_index] {
                Some(block_no) => block_no,
                None => {
                    let block_no = self.allocate_data_block();
                    inode.blocks[block_index] = Some(block_no);
                    block_no
                }
            };

            let mut block = self.store.get(block_no);
            block[start..end].copy_from_slice(&data[written..written + (end - start)]);
            self.store.put(block_no, &block);

            current += end - start;
            written += end - start;
        }

        inode.size = (offset + written) as u32;
        self.store_inode(n, &inode);
        Ok(written)
    }

    /// Reads up to `count` bytes starting at `offset`, clamped to the end
    /// of the file.
    pub fn read(&mut self, n: InodeNo, offset: usize, count: usize) -> Result<Vec<u8>, FsError> {
        let cfg = self.config();
        let inode = self.load_inode(n);
        if inode.ty != InodeType::File {
            return Err(FsError::ReadNotFile);
        }
        let size = inode.size as usize;
        if offset > size {
            return Err(FsError::ReadOffsetLargerThanSize);
        }

        let to_read = count.min(size - offset);
        let mut data = Vec::with_capacity(to_read);
        let mut current = offset;
        while data.len() < to_read {
            let block_index = current / cfg.block_size;
            let next_boundary = (block_index + 1) * cfg.block_size;

            let start = current % cfg.block_size;
            let end = if offset + to_read >= next_boundary {
                cfg.block_size
            } else {
                (offset + to_read) % cfg.block_size
            };

            let block_no = inode.blocks[block_index].expect("file data block missing");
            let block = self.store.get(block_no);
            data.extend_from_slice(&block[start..end]);
            current += end - start;
        }
        Ok(data)
    }

    /// Reverses the file's contents in place.
    pub fn mirror(&mut self, n: InodeNo) -> Result<usize, FsError> {
        let max = self.config().max_file_size();
        let mut data = self.read(n, 0, max)?;
        data.reverse();
        self.write(n, 0, &data)
    }

    /// Keeps only the `count` bytes starting at `offset`: reads the range
    /// and writes it back at offset 0, leaving the file exactly `count`
    /// bytes long.
    pub fn slice(&mut self, n: InodeNo, offset: usize, count: usize) -> Result<usize, FsError> {
        let size = self.load_inode(n).size as usize;
        if offset > size {
            return Err(FsError::SliceOffsetOutOfBounds);
        }
        if offset + count > size {
            return Err(FsError::SliceCountOutOfBounds);
        }
        let data = self.read(n, offset, count)?;
        self.write(n, 0, &data)
    }

    /// Removes the entry `name` from `dir` and drops one reference from
    /// the file it names.
    ///
    /// The directory's table is compacted: survivors are rewritten
    /// contiguously and the directory shrinks by one entry (and one
    /// reference). When the file's refcnt reaches zero its data blocks go
    /// back to the bitmap and the inode becomes INVALID, so a file stays
    /// alive as long as any hard link names it.
    pub fn unlink(&mut self, dir: InodeNo, name: &str) -> Result<(), FsError> {
        let cfg = self.config();
        let mut dir_inode = self.load_inode(dir);
        if dir_inode.ty != InodeType::Dir {
            return Err(FsError::UnlinkInvalidDir);
        }
        let target_no = self
            .dir_lookup(dir, name.as_bytes())
            .ok_or(FsError::UnlinkDoesNotExist)?;
        let mut target = self.load_inode(target_no);
        if target.ty != InodeType::File {
            return Err(FsError::UnlinkNotFile);
        }

        target.refcnt -= 1;

        // Compact: collect every surviving entry, then rewrite the table's
        // blocks densely with zeroed tails.
        let mut survivors = Vec::new();
        let mut offset = 0;
        while offset < dir_inode.size as usize {
            let de = self.dir_entry_at(&dir_inode, offset);
            if !de.is_name(name.as_bytes()) {
                survivors.push(de);
            }
            offset += DIR_ENTRY_SIZE;
        }

        let entries_per_block = cfg.entries_per_block();
        let blocks_covered = (dir_inode.size as usize).div_ceil(cfg.block_size);
        for block_index in 0..blocks_covered {
            let block_no = dir_inode.blocks[block_index].expect("directory data block missing");
            let mut block = vec![0; cfg.block_size];
            let first = block_index * entries_per_block;
            for (slot, de) in survivors.iter().skip(first).take(entries_per_block).enumerate() {
                let start = slot * DIR_ENTRY_SIZE;
                block[start..start + DIR_ENTRY_SIZE].copy_from_slice(de.as_bytes());
            }
            self.store.put(block_no, &block);
        }

        dir_inode.refcnt -= 1;
        dir_inode.size -= DIR_ENTRY_SIZE as u32;
        self.store_inode(target_no, &target);
        self.store_inode(dir, &dir_inode);

        if target.refcnt == 0 {
            let owned: Vec<BlockNo> = target.blocks.iter().flatten().copied().collect();
            for block_no in owned {
                self.free_data_block(block_no);
            }
            target.ty = InodeType::Invalid;
            self.store_inode(target_no, &target);
        }
        Ok(())
    }
}
