//! Reading and writing single inodes of the inode table.

use anyhow::{Context, Result};

use crate::{
    disk_format::{
        inode::{Inode, INODES_PER_BLOCK},
        layout::{INODE_BLOCK_START, NUM_INODES},
    },
    error::ErrorKind,
    rfs::{BlockNumber, InodeNumber},
    storage::{BlockStorage, Device},
};

/// The inode-table block holding `inum` and the slot within that block.
pub fn inode_location(inum: InodeNumber) -> Result<(BlockNumber, usize)> {
    let inum = inum as usize;
    if inum >= NUM_INODES {
        return Err(anyhow::Error::new(ErrorKind::Corrupted)
            .context(format!("invalid inode number: {inum}")));
    }

    Ok((INODE_BLOCK_START + inum / INODES_PER_BLOCK, inum % INODES_PER_BLOCK))
}

pub fn read_inode<S: BlockStorage>(device: &mut Device<S>, inum: InodeNumber) -> Result<Inode> {
    let (block_number, slot) = inode_location(inum)?;

    let block = device.read_block(block_number)?;
    Inode::from_slot(block, slot)
        .context(ErrorKind::Corrupted)
        .with_context(|| format!("reading inode {inum}"))
}

/// Read-modify-writes the block containing `inum` so neighbouring inodes are preserved.
pub fn write_inode<S: BlockStorage>(
    device: &mut Device<S>,
    inode: &Inode,
    inum: InodeNumber,
) -> Result<()> {
    let (block_number, slot) = inode_location(inum)?;

    let block = device.read_block(block_number)?;
    inode.to_slot(block, slot)?;
    device
        .write_block(block_number)
        .with_context(|| format!("writing inode {inum}"))
}

#[cfg(test)]
mod tests {
    use crate::{
        disk_format::inode::{InodeType, FREE_INODE},
        error::error_kind,
        storage::RamDisk,
    };

    use super::*;

    #[test]
    fn test_location() {
        assert_eq!(inode_location(0).unwrap(), (1, 0));
        assert_eq!(inode_location(3).unwrap(), (1, 3));
        assert_eq!(inode_location(4).unwrap(), (2, 0));
        assert_eq!(inode_location(39).unwrap(), (10, 3));

        let err = inode_location(40).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Corrupted));
    }

    #[test]
    fn test_write_preserves_neighbours() {
        let mut device = Device::new(0, "ramdisk0", RamDisk::default());
        let file = Inode::new(InodeType::File, &[20]);
        let directory = Inode::new(InodeType::Directory, &[21]);

        write_inode(&mut device, &file, 4).unwrap();
        write_inode(&mut device, &directory, 5).unwrap();
        write_inode(&mut device, &FREE_INODE, 6).unwrap();

        assert_eq!(read_inode(&mut device, 4).unwrap(), file);
        assert_eq!(read_inode(&mut device, 5).unwrap(), directory);
        assert_eq!(read_inode(&mut device, 6).unwrap(), FREE_INODE);
    }
}
