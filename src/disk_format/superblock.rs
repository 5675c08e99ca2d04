use std::mem::size_of;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{
    block::{Block, EMPTY_BLOCK},
    layout::{NUM_DATA_BLOCKS, NUM_INODES, TOTAL_BLOCKS},
};

/// The signature identifying an RFS device.
pub const MAGIC: i32 = 0xBEAF;

/// The number of bytes occupied by the superblock at the start of its block.
pub const SUPERBLOCK_SIZE: usize = 16;
const_assert!(size_of::<SuperBlock>() == SUPERBLOCK_SIZE);

/// The on-disk superblock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct SuperBlock {
    /// Must equal [`MAGIC`].
    pub magic: i32,
    /// The total number of blocks on the device.
    pub size: i32,
    /// The number of blocks in the data region.
    pub nblocks: i32,
    /// The number of inodes in the inode table.
    pub ninodes: i32,
}

impl SuperBlock {
    /// The superblock describing the fixed RFS layout.
    pub fn new() -> Self {
        SuperBlock {
            magic: MAGIC,
            size: TOTAL_BLOCKS as i32,
            nblocks: NUM_DATA_BLOCKS as i32,
            ninodes: NUM_INODES as i32,
        }
    }

    /// Parses a superblock from the start of `block`.
    pub fn from_block(block: &Block) -> Result<Self> {
        bincode::deserialize(&block[..SUPERBLOCK_SIZE]).context("parsing superblock")
    }

    /// Serializes the superblock into a block, zero-padded.
    pub fn to_block(&self) -> Result<Block> {
        let serialized = bincode::serialize(self).context("serializing superblock")?;

        let mut block = EMPTY_BLOCK;
        block[..SUPERBLOCK_SIZE].copy_from_slice(&serialized);
        Ok(block)
    }
}

impl Default for SuperBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order_and_byte_order() {
        let block = SuperBlock::new().to_block().unwrap();

        assert_eq!(&block[0..4], &0xBEAFi32.to_le_bytes());
        assert_eq!(&block[4..8], &112i32.to_le_bytes());
        assert_eq!(&block[8..12], &100i32.to_le_bytes());
        assert_eq!(&block[12..16], &40i32.to_le_bytes());
        assert!(block[SUPERBLOCK_SIZE..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_parse() {
        let mut block = EMPTY_BLOCK;
        block[0..4].copy_from_slice(&7i32.to_le_bytes());

        let superblock = SuperBlock::from_block(&block).unwrap();
        assert_eq!(superblock.magic, 7);
        assert_eq!(superblock.size, 0);
    }
}
