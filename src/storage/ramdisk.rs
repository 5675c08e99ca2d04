use anyhow::{anyhow, Result};

use crate::{
    disk_format::{
        block::{Block, EMPTY_BLOCK},
        layout::TOTAL_BLOCKS,
    },
    rfs::BlockNumber,
};

use super::block_storage::BlockStorage;

/// A ramdisk of zeroed blocks.
#[derive(Clone)]
pub struct RamDisk {
    blocks: Vec<Block>,
}

impl RamDisk {
    /// Constructs a ramdisk with `num_blocks` zeroed blocks.
    #[must_use]
    pub fn new(num_blocks: usize) -> Self {
        RamDisk {
            blocks: vec![EMPTY_BLOCK; num_blocks],
        }
    }

    /// The raw contents of the disk.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

impl Default for RamDisk {
    /// A ramdisk exactly as large as the RFS layout.
    fn default() -> Self {
        Self::new(TOTAL_BLOCKS)
    }
}

impl BlockStorage for RamDisk {
    fn read_block(&self, block_number: BlockNumber) -> Result<Block> {
        self.blocks
            .get(block_number)
            .copied()
            .ok_or(anyhow!("block number out of bounds: {block_number}"))
    }

    fn write_block(&mut self, block_number: BlockNumber, block: &Block) -> Result<()> {
        let slot = self
            .blocks
            .get_mut(block_number)
            .ok_or(anyhow!("block number out of bounds: {block_number}"))?;
        *slot = *block;

        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::disk_format::block::BLOCK_SIZE;

    use super::*;

    #[test]
    fn test_default_size() {
        assert_eq!(RamDisk::default().num_blocks(), TOTAL_BLOCKS);
    }

    #[test]
    fn test_write_then_read() {
        let mut ramdisk = RamDisk::new(3);
        ramdisk.write_block(2, &[0xfe; BLOCK_SIZE]).unwrap();

        assert_eq!(ramdisk.read_block(2).unwrap(), [0xfe; BLOCK_SIZE]);
        assert_eq!(ramdisk.read_block(1).unwrap(), EMPTY_BLOCK);
    }

    #[test]
    fn test_out_of_bounds_block() {
        let mut ramdisk = RamDisk::new(3);

        assert!(ramdisk.read_block(2).is_ok());
        assert!(ramdisk.read_block(3).is_err());
        assert!(ramdisk.write_block(3, &EMPTY_BLOCK).is_err());
    }
}
