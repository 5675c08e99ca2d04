use std::time::SystemTime;

use anyhow::Result;

use crate::disk_format::block::Block;
use crate::rfs::BlockNumber;

/// A block-addressed device. Block numbers are absolute.
pub trait BlockStorage {
    fn read_block(&self, block_number: BlockNumber) -> Result<Block>;

    fn write_block(&mut self, block_number: BlockNumber, block: &Block) -> Result<()>;

    /// The number of blocks the device holds.
    fn num_blocks(&self) -> usize;

    /// Times and ownership reported for every file on the device. RFS itself records neither.
    fn metadata(&self) -> Result<ImageMetadata> {
        Ok(ImageMetadata::default())
    }
}

/// Attributes of the backing image that stand in for per-file attributes.
#[derive(Clone, Copy, Debug)]
pub struct ImageMetadata {
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub crtime: SystemTime,
    pub uid: u32,
    pub gid: u32,
}

impl Default for ImageMetadata {
    fn default() -> Self {
        ImageMetadata {
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            crtime: SystemTime::UNIX_EPOCH,
            uid: 0,
            gid: 0,
        }
    }
}
