//! The fixed partition of an RFS ramdisk:
//!
//! ```text
//! superblock | disk inodes | bitmap | data blocks
//!   1 block  |  10 blocks  |   1    |    100
//! ```

use super::inode::{INODES_PER_BLOCK, NUM_DIRECT};

/// The block holding the superblock.
pub const SUPERBLOCK_BLOCK_NUMBER: usize = 0;

/// The first block of the inode table.
pub const INODE_BLOCK_START: usize = SUPERBLOCK_BLOCK_NUMBER + 1;

/// The number of blocks occupied by the inode table.
pub const NUM_INODE_BLOCKS: usize = 10;

/// The number of inodes in the inode table.
pub const NUM_INODES: usize = NUM_INODE_BLOCKS * INODES_PER_BLOCK;

/// The block holding the free-block bitmap.
pub const BITMAP_BLOCK_NUMBER: usize = INODE_BLOCK_START + NUM_INODE_BLOCKS;

/// The first block of the data region. Bitmap index 0 maps to this block.
pub const DATA_BLOCK_START: usize = BITMAP_BLOCK_NUMBER + 1;

/// Only direct blocks exist, so every inode can fill its direct array at most once.
pub const NUM_DATA_BLOCKS: usize = NUM_INODE_BLOCKS * NUM_DIRECT;

/// The total number of blocks on a formatted device.
pub const TOTAL_BLOCKS: usize = DATA_BLOCK_START + NUM_DATA_BLOCKS;

/// Returns whether `block_number` lies inside the data region.
pub fn is_data_block(block_number: usize) -> bool {
    (DATA_BLOCK_START..TOTAL_BLOCKS).contains(&block_number)
}
