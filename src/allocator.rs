use anyhow::{anyhow, ensure, Result};
use bitvec::vec::BitVec;
use log::warn;

use crate::{
    disk_format::{
        bitmap,
        block::Block,
        layout::{is_data_block, DATA_BLOCK_START, NUM_DATA_BLOCKS},
    },
    error::ErrorKind,
    rfs::BlockNumber,
};

/// Hands out data blocks. Block numbers are absolute.
pub trait BlockAllocator {
    /// Marks a free block as used and returns its number.
    fn alloc_block(&mut self) -> Result<BlockNumber>;

    /// Marks a block as free. Its contents are left alone.
    fn free_block(&mut self, block_number: BlockNumber) -> Result<()>;

    fn is_allocated(&self, block_number: BlockNumber) -> bool;

    fn num_free(&self) -> usize;
}

/// First-fit allocation over the in-memory free-block bitmap.
pub struct BitmapAllocator {
    /// A value of `true` represents "used". Index 0 is block [`DATA_BLOCK_START`].
    bitmap: BitVec,
}

impl BitmapAllocator {
    /// The bitmap of a freshly formatted device: only the root directory's block is used.
    pub fn formatted() -> Self {
        let mut bitmap = BitVec::repeat(false, NUM_DATA_BLOCKS);
        bitmap.set(0, true);

        BitmapAllocator { bitmap }
    }

    pub fn from_block(block: &Block) -> Result<Self> {
        Ok(BitmapAllocator {
            bitmap: bitmap::from_block(block)?,
        })
    }

    pub fn to_block(&self) -> Block {
        bitmap::to_block(&self.bitmap)
    }
}

impl BlockAllocator for BitmapAllocator {
    fn alloc_block(&mut self) -> Result<BlockNumber> {
        let index = self
            .bitmap
            .first_zero()
            .ok_or(anyhow!(ErrorKind::NoFreeBlock))?;
        self.bitmap.set(index, true);

        Ok(DATA_BLOCK_START + index)
    }

    fn free_block(&mut self, block_number: BlockNumber) -> Result<()> {
        ensure!(is_data_block(block_number), ErrorKind::BadBlockNumber);

        let index = block_number - DATA_BLOCK_START;
        if !self.bitmap[index] {
            warn!("freeing block {block_number}, which is already free");
        }
        self.bitmap.set(index, false);

        Ok(())
    }

    fn is_allocated(&self, block_number: BlockNumber) -> bool {
        is_data_block(block_number) && self.bitmap[block_number - DATA_BLOCK_START]
    }

    fn num_free(&self) -> usize {
        self.bitmap.count_zeros()
    }
}
