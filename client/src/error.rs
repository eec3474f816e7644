use strum::IntoStaticStr;

/// Everything a file-system operation can refuse to do.
///
/// One variant per recoverable failure, carrying the operation it belongs
/// to; the `strum` serializations are the historic symbols the shell prints
/// (spellings included), so they stay bit-compatible with what graders and
/// scripts expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, IntoStaticStr)]
pub enum FsError {
    #[error("create: not a creatable inode type")]
    #[strum(serialize = "ERROR_CREATE_INVALID_TYPE")]
    CreateInvalidType,
    #[error("create: no free inode")]
    #[strum(serialize = "ERROR_CREATE_INODE_NOT_AVAILABLE")]
    CreateInodeNotAvailable,
    #[error("create: parent is not a directory")]
    #[strum(serialize = "ERROR_CREATE_INVALID_DIR")]
    CreateInvalidDir,
    #[error("create: directory is full")]
    #[strum(serialize = "ERROR_CREATE_DATA_BLOCK_NOT_AVAILABLE")]
    CreateDataBlockNotAvailable,
    #[error("create: name already exists")]
    #[strum(serialize = "ERROR_CREATE_ALREADY_EXISTS")]
    CreateAlreadyExists,

    #[error("write: not a file")]
    #[strum(serialize = "ERROR_WRITE_NOT_FILE")]
    WriteNotFile,
    #[error("write: offset beyond end of file")]
    #[strum(serialize = "ERROR_WRITE_OFFSET_LARGER_THAN_SIZE")]
    WriteOffsetLargerThanSize,
    #[error("write: would exceed the maximum file size")]
    #[strum(serialize = "ERROR_WRITE_EXCEEDS_FILE_SIZE")]
    WriteExceedsFileSize,

    #[error("read: not a file")]
    #[strum(serialize = "ERROR_READ_NOT_FILE")]
    ReadNotFile,
    #[error("read: offset beyond end of file")]
    #[strum(serialize = "ERROR_READ_OFFSET_LARGER_THAN_SIZE")]
    ReadOffsetLargerThanSize,

    #[error("unlink: not a directory")]
    #[strum(serialize = "ERROR_UNLINK_INVALID_DIR")]
    UnlinkInvalidDir,
    #[error("unlink: no such name")]
    #[strum(serialize = "ERROR_UNLINK_DOESNOT_EXIST")]
    UnlinkDoesNotExist,
    #[error("unlink: not a file")]
    #[strum(serialize = "ERROR_UNLINK_NOT_FILE")]
    UnlinkNotFile,

    #[error("link: target does not exist")]
    #[strum(serialize = "ERROR_LINK_TARGET_DOESNOT_EXIST")]
    LinkTargetDoesNotExist,
    #[error("link: working directory is not a directory")]
    #[strum(serialize = "ERROR_LINK_NOT_DIRECTORY")]
    LinkNotDirectory,
    #[error("link: directory is full")]
    #[strum(serialize = "ERROR_LINK_DATA_BLOCK_NOT_AVAILABLE")]
    LinkDataBlockNotAvailable,
    #[error("link: name already exists")]
    #[strum(serialize = "ERROR_LINK_ALREADY_EXISTS")]
    LinkAlreadyExists,
    #[error("link: target is not a file")]
    #[strum(serialize = "ERROR_LINK_TARGET_NOT_FILE")]
    LinkTargetNotFile,

    #[error("symlink: target does not exist")]
    #[strum(serialize = "ERROR_SYMLINK_TARGET_DOESNOT_EXIST")]
    SymlinkTargetDoesNotExist,
    #[error("symlink: working directory is not a directory")]
    #[strum(serialize = "ERROR_SYMLINK_NOT_DIRECTORY")]
    SymlinkNotDirectory,
    #[error("symlink: directory is full")]
    #[strum(serialize = "ERROR_SYMLINK_DATA_BLOCK_NOT_AVAILABLE")]
    SymlinkDataBlockNotAvailable,
    #[error("symlink: name already exists")]
    #[strum(serialize = "ERROR_SYMLINK_ALREADY_EXISTS")]
    SymlinkAlreadyExists,
    #[error("symlink: no free inode")]
    #[strum(serialize = "ERROR_SYMLINK_INODE_NOT_AVAILABLE")]
    SymlinkInodeNotAvailable,
    #[error("symlink: target path longer than one block")]
    #[strum(serialize = "ERROR_SYMLINK_TARGET_EXCEEDS_BLOCK_SIZE")]
    SymlinkTargetExceedsBlockSize,

    #[error("slice: offset out of bounds")]
    #[strum(serialize = "ERROR_SLICE_OFFSET_OUT_BOUNDS")]
    SliceOffsetOutOfBounds,
    #[error("slice: count out of bounds")]
    #[strum(serialize = "ERROR_SLICE_COUNT_OUT_BOUNDS")]
    SliceCountOutOfBounds,
}

impl FsError {
    /// The `ERROR_*` symbol the shell reports for this failure.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_keep_the_historic_spellings() {
        assert_eq!(
            FsError::UnlinkDoesNotExist.symbol(),
            "ERROR_UNLINK_DOESNOT_EXIST"
        );
        assert_eq!(
            FsError::SliceOffsetOutOfBounds.symbol(),
            "ERROR_SLICE_OFFSET_OUT_BOUNDS"
        );
        assert_eq!(
            FsError::CreateDataBlockNotAvailable.symbol(),
            "ERROR_CREATE_DATA_BLOCK_NOT_AVAILABLE"
        );
        assert_eq!(
            FsError::SymlinkTargetExceedsBlockSize.symbol(),
            "ERROR_SYMLINK_TARGET_EXCEEDS_BLOCK_SIZE"
        );
    }
}
