use core::fmt;

use dataview::Pod;
use strum::FromRepr;

use crate::config::{FsConfig, INODE_HEADER_SIZE, INODE_NUMBER_SIZE, MAX_FILENAME};

/// Logical (client-side) block number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct BlockNo(u32);

impl fmt::Display for BlockNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BlockNo {
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_index(&self) -> usize {
        self.0 as usize
    }
}

/// Inode number. Inode 0 is the root directory and is never reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct InodeNo(u32);

impl fmt::Display for InodeNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl InodeNo {
    pub const ROOT: Self = Self::new(0);

    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_index(&self) -> usize {
        self.0 as usize
    }
}

/// On-disk inode type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u16)]
pub enum InodeType {
    Invalid = 0,
    File = 1,
    Dir = 2,
    Sym = 3,
}

/// In-memory copy of one inode record.
///
/// On disk the record is `inode_size` bytes, big-endian: `size` in bytes
/// 0..4, `type` in 4..6, `refcnt` in 6..8, then one 4-byte direct block
/// number per remaining slot, zero meaning unallocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub size: u32,
    pub ty: InodeType,
    pub refcnt: u16,
    pub blocks: Vec<Option<BlockNo>>,
}

impl Inode {
    /// An unallocated record: invalid, zero size, no block numbers.
    #[must_use]
    pub fn empty(cfg: &FsConfig) -> Self {
        Self {
            size: 0,
            ty: InodeType::Invalid,
            refcnt: 0,
            blocks: vec![None; cfg.max_blocks_per_file()],
        }
    }

    /// Decodes a record from its `inode_size`-byte slice of the inode table.
    ///
    /// # Panics
    ///
    /// Panics if the slice has the wrong length or the type field holds a
    /// value no inode type maps to (on-disk corruption).
    #[must_use]
    pub fn decode(cfg: &FsConfig, bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), cfg.inode_size, "inode record length");

        let size = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let raw_ty = u16::from_be_bytes(bytes[4..6].try_into().unwrap());
        let ty = InodeType::from_repr(raw_ty)
            .unwrap_or_else(|| panic!("corrupted inode type {raw_ty}"));
        let refcnt = u16::from_be_bytes(bytes[6..8].try_into().unwrap());

        let blocks = (0..cfg.max_blocks_per_file())
            .map(|i| {
                let start = INODE_HEADER_SIZE + i * INODE_NUMBER_SIZE;
                let n = u32::from_be_bytes(bytes[start..start + 4].try_into().unwrap());
                (n != 0).then(|| BlockNo::new(n))
            })
            .collect();

        Self {
            size,
            ty,
            refcnt,
            blocks,
        }
    }

    /// Serializes the record back to its on-disk form.
    #[must_use]
    pub fn encode(&self, cfg: &FsConfig) -> Vec<u8> {
        assert_eq!(self.blocks.len(), cfg.max_blocks_per_file());

        let mut bytes = vec![0; cfg.inode_size];
        bytes[0..4].copy_from_slice(&self.size.to_be_bytes());
        bytes[4..6].copy_from_slice(&(self.ty as u16).to_be_bytes());
        bytes[6..8].copy_from_slice(&self.refcnt.to_be_bytes());
        for (i, bn) in self.blocks.iter().enumerate() {
            let start = INODE_HEADER_SIZE + i * INODE_NUMBER_SIZE;
            let n = bn.map_or(0, |bn| bn.value());
            bytes[start..start + 4].copy_from_slice(&n.to_be_bytes());
        }
        bytes
    }
}

/// Width of one directory entry on disk.
pub const DIR_ENTRY_SIZE: usize = MAX_FILENAME + INODE_NUMBER_SIZE;

/// One (name, inode number) binding inside a directory data block.
///
/// The name is UTF-8, right-padded with NUL; the inode number is big-endian.
/// A directory's entry table is dense: entries live at offsets
/// `0, DIR_ENTRY_SIZE, ...` up to the directory inode's `size`.
#[derive(Clone, Copy, Pod)]
#[repr(C)]
pub struct DirEntry {
    name: [u8; MAX_FILENAME],
    ino: [u8; INODE_NUMBER_SIZE],
}

impl DirEntry {
    #[must_use]
    pub fn new(name: &[u8], ino: InodeNo) -> Self {
        let mut de = Self {
            name: [0; MAX_FILENAME],
            ino: [0; INODE_NUMBER_SIZE],
        };
        de.set_name(name);
        de.set_ino(ino);
        de
    }

    /// The stored name, without padding.
    #[must_use]
    pub fn name(&self) -> &[u8] {
        let len = memchr::memchr(0, &self.name).unwrap_or(MAX_FILENAME);
        &self.name[..len]
    }

    /// # Panics
    ///
    /// Panics if `name` exceeds [`MAX_FILENAME`]; callers bound-check first.
    pub fn set_name(&mut self, name: &[u8]) {
        assert!(name.len() <= MAX_FILENAME, "file name exceeds maximum");
        self.name[..name.len()].copy_from_slice(name);
        self.name[name.len()..].fill(0);
    }

    /// Padded-name comparison, the same `MAX_FILENAME`-wide equality the
    /// on-disk scan performs.
    #[must_use]
    pub fn is_name(&self, name: &[u8]) -> bool {
        name.len() <= MAX_FILENAME
            && self.name[..name.len()] == *name
            && self.name[name.len()..].iter().all(|&b| b == 0)
    }

    #[must_use]
    pub fn ino(&self) -> InodeNo {
        InodeNo::new(u32::from_be_bytes(self.ino))
    }

    pub fn set_ino(&mut self, ino: InodeNo) {
        self.ino = ino.value().to_be_bytes();
    }
}

impl fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirEntry")
            .field("name", &String::from_utf8_lossy(self.name()))
            .field("ino", &self.ino())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_codec_round_trip() {
        let cfg = FsConfig::default();
        let inode = Inode {
            size: 200,
            ty: InodeType::File,
            refcnt: 2,
            blocks: vec![Some(BlockNo::new(7)), None],
        };
        let bytes = inode.encode(&cfg);
        assert_eq!(bytes.len(), cfg.inode_size);
        assert_eq!(Inode::decode(&cfg, &bytes), inode);
    }

    #[test]
    fn inode_fields_are_big_endian() {
        let cfg = FsConfig::default();
        let inode = Inode {
            size: 0x0102_0304,
            ty: InodeType::Dir,
            refcnt: 0x0506,
            blocks: vec![Some(BlockNo::new(0x0708_090a)), None],
        };
        let bytes = inode.encode(&cfg);
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[4..6], &[0, 2]);
        assert_eq!(&bytes[6..8], &[5, 6]);
        assert_eq!(&bytes[8..12], &[7, 8, 9, 0x0a]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "corrupted inode type")]
    fn inode_decode_rejects_unknown_type() {
        let cfg = FsConfig::default();
        let mut bytes = Inode::empty(&cfg).encode(&cfg);
        bytes[5] = 9;
        let _ = Inode::decode(&cfg, &bytes);
    }

    #[test]
    fn dir_entry_pads_with_nul() {
        let de = DirEntry::new(b"f", InodeNo::new(3));
        assert_eq!(de.name(), b"f");
        assert!(de.is_name(b"f"));
        assert!(!de.is_name(b"ff"));
        assert!(!de.is_name(b""));
        assert_eq!(de.ino(), InodeNo::new(3));
    }

    #[test]
    fn dir_entry_full_width_name() {
        let de = DirEntry::new(b"abcdefghijkl", InodeNo::new(1));
        assert_eq!(de.name(), b"abcdefghijkl");
        assert!(de.is_name(b"abcdefghijkl"));
        assert!(!de.is_name(b"abcdefghijk"));
    }

    #[test]
    fn dir_entry_layout() {
        assert_eq!(size_of::<DirEntry>(), DIR_ENTRY_SIZE);
        let de = DirEntry::new(b"x", InodeNo::new(0x0102_0304));
        let bytes = dataview::PodMethods::as_bytes(&de);
        assert_eq!(bytes[0], b'x');
        assert_eq!(&bytes[MAX_FILENAME..], &[1, 2, 3, 4]);
    }
}
