//! Error kinds attached to `anyhow` errors.
//!
//! Every failing operation returns an [`anyhow::Error`]. Errors that callers are expected to
//! react to carry an [`ErrorKind`], either as the error itself or as context, which can be
//! recovered with [`error_kind`].

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The superblock does not carry the RFS signature.
    BadMagic,
    /// On-disk state contradicts the layout invariants.
    Corrupted,
    /// A read or write started past the end of the file.
    OffsetOutOfBounds,
    /// Every inode is in use.
    NoFreeInode,
    /// Every data block is in use.
    NoFreeBlock,
    /// A block number outside the data region was handed to the allocator.
    BadBlockNumber,
    /// Formatting the device failed.
    Format,
    /// The device could not be read while mounting.
    Mount,
    /// The underlying device failed a block transfer.
    Io,
    /// No entry with the requested name exists.
    NotFound,
    /// An entry with the requested name already exists.
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    /// Unknown `whence`, or a seek that would leave `[0, size]`.
    InvalidSeek,
    InvalidName,
    NameTooLong,
    /// The directory's data block has no room for another entry.
    DirectoryFull,
    /// The write would need more than the direct blocks of an inode.
    FileTooLarge,
    NoSuchDevice,
    RegistryFull,
}

impl ErrorKind {
    /// Fatal errors mean the file system is corrupted or was misused; there is no recovery path
    /// short of reformatting. Everything else leaves the file system unchanged.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::BadMagic
                | ErrorKind::Corrupted
                | ErrorKind::OffsetOutOfBounds
                | ErrorKind::NoFreeInode
                | ErrorKind::NoFreeBlock
                | ErrorKind::BadBlockNumber
                | ErrorKind::Format
                | ErrorKind::Mount
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            ErrorKind::BadMagic => "wrong magic number, not an RFS device",
            ErrorKind::Corrupted => "file system is corrupted",
            ErrorKind::OffsetOutOfBounds => "offset is beyond the end of the file",
            ErrorKind::NoFreeInode => "no more free disk inodes",
            ErrorKind::NoFreeBlock => "no more free blocks",
            ErrorKind::BadBlockNumber => "block number is outside the data region",
            ErrorKind::Format => "failed to format device",
            ErrorKind::Mount => "failed to read device while mounting",
            ErrorKind::Io => "device I/O failed",
            ErrorKind::NotFound => "no such file or directory",
            ErrorKind::AlreadyExists => "file exists",
            ErrorKind::NotADirectory => "not a directory",
            ErrorKind::IsADirectory => "is a directory",
            ErrorKind::InvalidSeek => "invalid seek",
            ErrorKind::InvalidName => "invalid file name",
            ErrorKind::NameTooLong => "file name too long",
            ErrorKind::DirectoryFull => "directory is full",
            ErrorKind::FileTooLarge => "file too large",
            ErrorKind::NoSuchDevice => "no such device",
            ErrorKind::RegistryFull => "no free device slot",
        };

        f.write_str(description)
    }
}

impl std::error::Error for ErrorKind {}

/// Returns the outermost [`ErrorKind`] attached to `err`, if any.
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<ErrorKind>().copied()
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context, Result};

    use super::*;

    #[test]
    fn test_kind_as_error() {
        let err = anyhow::Error::new(ErrorKind::NotFound).context("looking up \"x\"");
        assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_kind_as_context() {
        let result: Result<()> = Err(anyhow!("short read")).context(ErrorKind::Io);
        assert_eq!(error_kind(&result.unwrap_err()), Some(ErrorKind::Io));
    }

    #[test]
    fn test_outermost_kind_wins() {
        let err = anyhow::Error::new(ErrorKind::Io).context(ErrorKind::Format);
        assert_eq!(error_kind(&err), Some(ErrorKind::Format));
    }

    #[test]
    fn test_untagged_error() {
        assert_eq!(error_kind(&anyhow!("plain")), None);
    }

    #[test]
    fn test_severity() {
        assert!(ErrorKind::BadMagic.is_fatal());
        assert!(ErrorKind::OffsetOutOfBounds.is_fatal());
        assert!(ErrorKind::Mount.is_fatal());
        assert!(!ErrorKind::NotFound.is_fatal());
        assert!(!ErrorKind::InvalidSeek.is_fatal());
        assert!(!ErrorKind::Io.is_fatal());
        assert!(!ErrorKind::FileTooLarge.is_fatal());
    }
}
