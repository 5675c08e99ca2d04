//! Laying down an empty file system.

use anyhow::{ensure, Context, Result};
use log::info;

use crate::{
    allocator::BitmapAllocator,
    disk_format::{
        block::EMPTY_BLOCK,
        inode::{Inode, InodeType, FREE_INODE, INODES_PER_BLOCK},
        layout::{
            BITMAP_BLOCK_NUMBER, DATA_BLOCK_START, INODE_BLOCK_START, NUM_INODE_BLOCKS,
            SUPERBLOCK_BLOCK_NUMBER, TOTAL_BLOCKS,
        },
        superblock::SuperBlock,
    },
    error::ErrorKind,
    inode_store,
    rfs::ROOT_INODE,
    storage::{BlockStorage, Device},
};

/// Formats `device` with an empty RFS: a superblock, an inode table of free inodes, a root
/// directory at inode [`ROOT_INODE`] owning the first data block, and a bitmap with only that
/// block used.
///
/// Destructive. Any failure leaves the device unusable and is reported as
/// [`ErrorKind::Format`].
pub fn format<S: BlockStorage>(device: &mut Device<S>) -> Result<()> {
    lay_down(device)
        .context(ErrorKind::Format)
        .with_context(|| format!("formatting {}", device.name()))?;

    info!("RFS: format {} done", device.name());
    Ok(())
}

fn lay_down<S: BlockStorage>(device: &mut Device<S>) -> Result<()> {
    ensure!(
        device.num_blocks() >= TOTAL_BLOCKS,
        "device has {} blocks, RFS needs {TOTAL_BLOCKS}",
        device.num_blocks()
    );

    let superblock = SuperBlock::new().to_block()?;
    device.write_whole_block(SUPERBLOCK_BLOCK_NUMBER, &superblock)?;

    let mut inode_block = EMPTY_BLOCK;
    for slot in 0..INODES_PER_BLOCK {
        FREE_INODE.to_slot(&mut inode_block, slot)?;
    }
    for block_number in INODE_BLOCK_START..INODE_BLOCK_START + NUM_INODE_BLOCKS {
        device.write_whole_block(block_number, &inode_block)?;
    }

    let root = Inode::new(InodeType::Directory, &[DATA_BLOCK_START as i32]);
    inode_store::write_inode(device, &root, ROOT_INODE)?;

    let bitmap = BitmapAllocator::formatted().to_block();
    device.write_whole_block(BITMAP_BLOCK_NUMBER, &bitmap)?;

    Ok(())
}
