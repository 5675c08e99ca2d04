use anyhow::{ensure, Result};
use bitvec::vec::BitVec;

use crate::error::ErrorKind;

use super::{
    block::{Block, BLOCK_SIZE, EMPTY_BLOCK},
    layout::NUM_DATA_BLOCKS,
};

/// The width of one bitmap entry on the disk. Entries are 32-bit integers, `0` for free and `1`
/// for used.
pub const BITMAP_ENTRY_SIZE: usize = 4;
const_assert!(NUM_DATA_BLOCKS * BITMAP_ENTRY_SIZE <= BLOCK_SIZE);

/// Parses the bitmap block into one bit per data block. A value of `true` represents "used".
pub fn from_block(block: &Block) -> Result<BitVec> {
    let mut bitmap = BitVec::with_capacity(NUM_DATA_BLOCKS);

    for entry in block.chunks_exact(BITMAP_ENTRY_SIZE).take(NUM_DATA_BLOCKS) {
        let value = i32::from_le_bytes(entry.try_into().expect("chunks are BITMAP_ENTRY_SIZE long"));
        ensure!(value == 0 || value == 1, ErrorKind::Corrupted);

        bitmap.push(value == 1);
    }

    Ok(bitmap)
}

/// Serializes the bitmap into a zero-padded block.
pub fn to_block(bitmap: &BitVec) -> Block {
    let mut block = EMPTY_BLOCK;

    for (entry, used) in block.chunks_exact_mut(BITMAP_ENTRY_SIZE).zip(bitmap.iter()) {
        entry.copy_from_slice(&i32::from(*used).to_le_bytes());
    }

    block
}
