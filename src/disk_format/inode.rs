use std::mem::size_of;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::block::BLOCK_SIZE;

/// The width of an inode slot in the inode table.
pub const INODE_SIZE: usize = 128;

/// The number of bytes of an inode slot that hold the packed [`Inode`]. The rest of the slot
/// is zero.
pub const PACKED_INODE_SIZE: usize = 56;
const_assert!(size_of::<Inode>() == PACKED_INODE_SIZE);
const_assert!(PACKED_INODE_SIZE <= INODE_SIZE);

/// The number of direct block numbers per inode. There are no indirect blocks.
pub const NUM_DIRECT: usize = 10;

const_assert!(BLOCK_SIZE % INODE_SIZE == 0);
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

pub const MAX_FILE_SIZE: usize = NUM_DIRECT * BLOCK_SIZE;

/// An unused inode, as laid down by the formatter.
pub const FREE_INODE: Inode = Inode {
    size: 0,
    type_: InodeType::Free,
    nlinks: 0,
    blocks: 0,
    addrs: [0; NUM_DIRECT],
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Inode {
    /// file size in bytes
    pub size: i32,
    /// file type (e.g., directory or regular)
    pub type_: InodeType,
    /// number of hard links to inode
    pub nlinks: i32,
    /// number of allocated blocks, a prefix of `addrs`
    pub blocks: i32,
    /// block #s of the direct blocks
    pub addrs: [i32; NUM_DIRECT],
}

impl Inode {
    /// A fresh inode of `type_` with one link and `blocks` allocated blocks.
    pub fn new(type_: InodeType, addrs: &[i32]) -> Self {
        let mut inode = Inode {
            size: 0,
            type_,
            nlinks: 1,
            blocks: addrs.len() as i32,
            ..FREE_INODE
        };
        inode.addrs[..addrs.len()].copy_from_slice(addrs);

        inode
    }

    /// Parses the inode stored in slot `slot` of an inode-table block.
    pub fn from_slot(block: &[u8; BLOCK_SIZE], slot: usize) -> Result<Inode> {
        let start = slot * INODE_SIZE;
        bincode::deserialize(&block[start..start + PACKED_INODE_SIZE]).context("parsing inode")
    }

    /// Serializes the inode into slot `slot` of an inode-table block, leaving the other slots
    /// untouched.
    pub fn to_slot(&self, block: &mut [u8; BLOCK_SIZE], slot: usize) -> Result<()> {
        let serialized = bincode::serialize(self).context("serializing inode")?;

        let start = slot * INODE_SIZE;
        block[start..start + PACKED_INODE_SIZE].copy_from_slice(&serialized);
        block[start + PACKED_INODE_SIZE..start + INODE_SIZE].fill(0);

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum InodeType {
    /// This inode describes a regular data file.
    File = 0,
    /// This inode describes a directory.
    Directory = 1,
    /// This inode is not in use for any file.
    Free = 2,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_format::block::EMPTY_BLOCK;

    #[test]
    fn test_packed_layout() {
        let inode = Inode {
            size: 600,
            ..Inode::new(InodeType::File, &[12, 13])
        };

        let mut block = [0xff; BLOCK_SIZE];
        inode.to_slot(&mut block, 1).unwrap();

        let slot = &block[INODE_SIZE..2 * INODE_SIZE];
        assert_eq!(&slot[0..4], &600i32.to_le_bytes());
        assert_eq!(&slot[4..8], &0i32.to_le_bytes());
        assert_eq!(&slot[8..12], &1i32.to_le_bytes());
        assert_eq!(&slot[12..16], &2i32.to_le_bytes());
        assert_eq!(&slot[16..20], &12i32.to_le_bytes());
        assert_eq!(&slot[20..24], &13i32.to_le_bytes());
        assert!(slot[PACKED_INODE_SIZE..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_neighbouring_slots_untouched() {
        let mut block = [0xab; BLOCK_SIZE];
        FREE_INODE.to_slot(&mut block, 2).unwrap();

        assert!(block[..2 * INODE_SIZE].iter().all(|b| *b == 0xab));
        assert!(block[3 * INODE_SIZE..].iter().all(|b| *b == 0xab));
        assert_eq!(Inode::from_slot(&block, 2).unwrap(), FREE_INODE);
    }

    #[test]
    fn test_free_type_code() {
        let mut block = EMPTY_BLOCK;
        FREE_INODE.to_slot(&mut block, 0).unwrap();
        assert_eq!(&block[4..8], &2i32.to_le_bytes());
    }

    #[test]
    fn test_invalid_type_code() {
        let mut block = EMPTY_BLOCK;
        block[4..8].copy_from_slice(&9i32.to_le_bytes());
        assert!(Inode::from_slot(&block, 0).is_err());
    }
}
