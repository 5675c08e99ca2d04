//! The in-memory side of inodes and the operation set the VFS layer calls.

use std::ffi::CStr;

use anyhow::{Context, Result};

use crate::{
    disk_format::inode::{Inode, InodeType, NUM_DIRECT},
    error::ErrorKind,
    rfs::{BlockNumber, InodeNumber},
};

/// The in-memory counterpart of a disk inode.
///
/// Vnodes are plain values. Several vnodes may describe the same inode; nothing keeps them
/// coherent, and whichever is written back last wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vnode {
    pub inum: InodeNumber,
    pub size: usize,
    pub type_: InodeType,
    pub nlinks: u32,
    /// number of allocated blocks, a prefix of `addrs`
    pub blocks: usize,
    pub addrs: [BlockNumber; NUM_DIRECT],
}

impl Vnode {
    /// An unpopulated vnode for `inum`, to be refreshed from the disk.
    pub fn new(inum: InodeNumber) -> Self {
        Vnode {
            inum,
            size: 0,
            type_: InodeType::Free,
            nlinks: 0,
            blocks: 0,
            addrs: [0; NUM_DIRECT],
        }
    }

    pub fn is_dir(&self) -> bool {
        self.type_ == InodeType::Directory
    }

    /// Overwrites the mirrored fields with those of `inode`.
    pub fn load(&mut self, inode: &Inode) -> Result<()> {
        let size = usize::try_from(inode.size).context(ErrorKind::Corrupted)?;
        let nlinks = u32::try_from(inode.nlinks).context(ErrorKind::Corrupted)?;
        let blocks = usize::try_from(inode.blocks).context(ErrorKind::Corrupted)?;
        if blocks > NUM_DIRECT {
            return Err(anyhow::Error::new(ErrorKind::Corrupted)
                .context(format!("inode {} claims {blocks} blocks", self.inum)));
        }

        let mut addrs = [0; NUM_DIRECT];
        for (addr, disk_addr) in addrs.iter_mut().zip(inode.addrs) {
            *addr = usize::try_from(disk_addr).context(ErrorKind::Corrupted)?;
        }

        self.size = size;
        self.type_ = inode.type_;
        self.nlinks = nlinks;
        self.blocks = blocks;
        self.addrs = addrs;

        Ok(())
    }

    /// The disk inode holding this vnode's persisted fields.
    pub fn to_inode(&self) -> Inode {
        Inode {
            size: self.size as i32,
            type_: self.type_,
            nlinks: self.nlinks as i32,
            blocks: self.blocks as i32,
            addrs: self.addrs.map(|addr| addr as i32),
        }
    }
}

/// File information as reported by [`VnodeOps::stat`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stat {
    pub inum: InodeNumber,
    pub size: usize,
    pub type_: InodeType,
    pub nlinks: u32,
    pub blocks: usize,
}

pub const LSEEK_SET: i32 = 0;
pub const LSEEK_CUR: i32 = 1;

/// The reference point of a seek.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    /// Seek to an absolute offset.
    Set,
    /// Seek relative to the current offset.
    Cur,
}

impl TryFrom<i32> for Whence {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            LSEEK_SET => Ok(Whence::Set),
            LSEEK_CUR => Ok(Whence::Cur),
            _ => Err(anyhow::Error::new(ErrorKind::InvalidSeek).context(format!("whence {value}"))),
        }
    }
}

/// The operations a file system provides to the VFS layer.
///
/// Offsets are cursors owned by the caller. `read` and `write` require `*offset <= size`, which
/// `lseek` guarantees. `write` does not persist the vnode; callers follow it with `write_back`.
pub trait VnodeOps {
    fn read(&mut self, vnode: &Vnode, buf: &mut [u8], offset: &mut usize) -> Result<usize>;

    fn write(&mut self, vnode: &mut Vnode, data: &[u8], offset: &mut usize) -> Result<usize>;

    fn create(&mut self, parent: &mut Vnode, name: &CStr) -> Result<Vnode>;

    fn lseek(
        &self,
        vnode: &Vnode,
        new_offset: isize,
        whence: Whence,
        offset: &mut usize,
    ) -> Result<()>;

    fn stat(&mut self, vnode: &Vnode) -> Result<Stat>;

    /// Looks up one path component. A missing name is `Ok(None)`.
    fn lookup(&mut self, parent: &Vnode, name: &CStr) -> Result<Option<Vnode>>;

    fn write_back(&mut self, vnode: &Vnode) -> Result<()>;
}
