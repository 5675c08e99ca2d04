use std::cell::Cell;
use std::rc::Rc;

use anyhow::{bail, Result};

use crate::disk_format::block::Block;
use crate::rfs::BlockNumber;

use super::{BlockStorage, RamDisk};

/// A ramdisk that refuses writes while the shared switch is on.
pub struct FlakyDisk {
    disk: RamDisk,
    fail_writes: Rc<Cell<bool>>,
}

impl FlakyDisk {
    /// The disk and the switch that controls it.
    pub fn new() -> (Self, Rc<Cell<bool>>) {
        let fail_writes = Rc::new(Cell::new(false));
        let disk = FlakyDisk {
            disk: RamDisk::default(),
            fail_writes: Rc::clone(&fail_writes),
        };

        (disk, fail_writes)
    }
}

impl BlockStorage for FlakyDisk {
    fn read_block(&self, block_number: BlockNumber) -> Result<Block> {
        self.disk.read_block(block_number)
    }

    fn write_block(&mut self, block_number: BlockNumber, block: &Block) -> Result<()> {
        if self.fail_writes.get() {
            bail!("write of block {block_number} refused");
        }

        self.disk.write_block(block_number, block)
    }

    fn num_blocks(&self) -> usize {
        self.disk.num_blocks()
    }
}
