use std::ffi::CStr;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::{
    allocator::{BitmapAllocator, BlockAllocator},
    disk_format::{
        inode::{Inode, InodeType, FREE_INODE},
        layout::{BITMAP_BLOCK_NUMBER, NUM_INODES, SUPERBLOCK_BLOCK_NUMBER},
        superblock::{SuperBlock, MAGIC},
    },
    error::ErrorKind,
    inode_store,
    storage::{BlockStorage, Device},
    vnode::{Stat, Vnode, VnodeOps, Whence},
};

/// Consistency checking.
mod check;
/// Directory entries: lookup, linking and unlinking.
mod directory;
/// Byte-range reads and writes over a file's blocks.
mod file;

// inode numbers are represented as `i32`s on the disk, but we use `u32`s for logical accuracy
pub type InodeNumber = u32;

// block numbers are represented as `i32`s on the disk, but we use `usize`s to avoid littering
// the code with casts.
pub type BlockNumber = usize;

/// The root directory's inode number. It exists from format on and is never freed.
pub const ROOT_INODE: InodeNumber = 0;

/// A mounted RFS.
///
/// Owns the device for the lifetime of the mount. The free-block bitmap is loaded at mount and
/// is the only record of allocations until [`Rfs::sync`] or [`Rfs::unmount`] writes it back.
pub struct Rfs<S: BlockStorage> {
    device: Device<S>,
    superblock: SuperBlock,
    allocator: BitmapAllocator,
}

impl<S: BlockStorage> Rfs<S> {
    /// Reads the superblock and the bitmap of `device` and checks for a root directory.
    pub fn mount(device: Device<S>) -> Result<Self> {
        Self::try_mount(device).map_err(|(err, _)| err)
    }

    /// Like [`Rfs::mount`], but hands the device back on failure.
    pub fn try_mount(mut device: Device<S>) -> Result<Self, (anyhow::Error, Device<S>)> {
        match Self::load(&mut device) {
            Ok((superblock, allocator)) => {
                info!(
                    "RFS: mounted {} ({} blocks, {} data blocks, {} inodes, {} free blocks)",
                    device.name(),
                    superblock.size,
                    superblock.nblocks,
                    superblock.ninodes,
                    allocator.num_free()
                );

                Ok(Rfs {
                    device,
                    superblock,
                    allocator,
                })
            }
            Err(err) => Err((err, device)),
        }
    }

    fn load(device: &mut Device<S>) -> Result<(SuperBlock, BitmapAllocator)> {
        let block = device
            .read_block(SUPERBLOCK_BLOCK_NUMBER)
            .context("reading superblock")
            .context(ErrorKind::Mount)?;
        let superblock = SuperBlock::from_block(block).context(ErrorKind::Corrupted)?;

        if superblock.magic != MAGIC {
            return Err(anyhow::Error::new(ErrorKind::BadMagic)
                .context(format!("{} is not an RFS device", device.name())));
        }

        if superblock != SuperBlock::new() {
            return Err(anyhow::Error::new(ErrorKind::Corrupted)
                .context(format!("unexpected layout in superblock: {superblock:?}")));
        }

        if device.num_blocks() < superblock.size as usize {
            return Err(anyhow::Error::new(ErrorKind::Corrupted).context(format!(
                "superblock claims {} blocks, device has {}",
                superblock.size,
                device.num_blocks()
            )));
        }

        let root = inode_store::read_inode(device, ROOT_INODE)
            .context("reading root inode")
            .context(ErrorKind::Mount)?;
        if root.type_ != InodeType::Directory {
            return Err(anyhow::Error::new(ErrorKind::Corrupted)
                .context("root inode does not represent a directory"));
        }

        let block = *device
            .read_block(BITMAP_BLOCK_NUMBER)
            .context("reading bitmap")
            .context(ErrorKind::Mount)?;
        let allocator = BitmapAllocator::from_block(&block).context("parsing bitmap")?;

        Ok((superblock, allocator))
    }

    /// Writes the in-memory bitmap back to the disk.
    pub fn sync(&mut self) -> Result<()> {
        let block = self.allocator.to_block();
        self.device
            .write_whole_block(BITMAP_BLOCK_NUMBER, &block)
            .context("writing bitmap")
    }

    /// Syncs and gives the device back.
    pub fn unmount(self) -> Result<Device<S>> {
        self.try_unmount().map_err(|(err, _)| err)
    }

    /// Like [`Rfs::unmount`], but hands the mount back when the sync fails.
    pub fn try_unmount(mut self) -> Result<Device<S>, (anyhow::Error, Self)> {
        if let Err(err) = self.sync() {
            return Err((err, self));
        }
        info!("RFS: unmounted {}", self.device.name());

        Ok(self.device)
    }

    /// Gives the device back without syncing. Allocations made since the last sync are lost.
    pub fn into_device(self) -> Device<S> {
        self.device
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn device(&self) -> &Device<S> {
        &self.device
    }

    /// The vnode of the root directory.
    pub fn root(&mut self) -> Result<Vnode> {
        self.vnode(ROOT_INODE)
    }

    /// Allocates a vnode for `inum` and populates it from the disk.
    pub fn vnode(&mut self, inum: InodeNumber) -> Result<Vnode> {
        let mut vnode = Vnode::new(inum);
        self.vnode_refresh(&mut vnode)?;

        Ok(vnode)
    }

    pub fn read_inode(&mut self, inum: InodeNumber) -> Result<Inode> {
        inode_store::read_inode(&mut self.device, inum)
    }

    pub fn write_inode(&mut self, inode: &Inode, inum: InodeNumber) -> Result<()> {
        inode_store::write_inode(&mut self.device, inode, inum)
    }

    /// Persists the vnode's size, type, links and block list into its disk inode.
    pub fn vnode_write_back(&mut self, vnode: &Vnode) -> Result<()> {
        debug!(
            "[inode #{}] write back (size = {}; blocks = {})",
            vnode.inum, vnode.size, vnode.blocks
        );

        self.write_inode(&vnode.to_inode(), vnode.inum)
            .context("writing back vnode")
    }

    /// Overwrites the vnode's fields with its disk inode.
    pub fn vnode_refresh(&mut self, vnode: &mut Vnode) -> Result<()> {
        let inode = self.read_inode(vnode.inum)?;
        vnode.load(&inode)
    }

    /// First-fit allocation of a data block. The returned number is absolute.
    pub fn alloc_block(&mut self) -> Result<BlockNumber> {
        let block_number = self.allocator.alloc_block()?;
        debug!("allocated block {block_number}");

        Ok(block_number)
    }

    /// Releases a data block without touching its contents.
    pub fn free_block(&mut self, block_number: BlockNumber) -> Result<()> {
        self.allocator.free_block(block_number)?;
        debug!("freed block {block_number}");

        Ok(())
    }

    pub fn is_block_allocated(&self, block_number: BlockNumber) -> bool {
        self.allocator.is_allocated(block_number)
    }

    pub fn num_free_blocks(&self) -> usize {
        self.allocator.num_free()
    }

    pub fn num_free_inodes(&mut self) -> Result<usize> {
        let mut free = 0;
        for inum in 0..NUM_INODES as InodeNumber {
            if self.read_inode(inum)?.type_ == InodeType::Free {
                free += 1;
            }
        }

        Ok(free)
    }

    /// Reads the inode behind `vnode` fresh from the disk.
    pub fn disk_stat(&mut self, vnode: &Vnode) -> Result<Stat> {
        let fresh = self.vnode(vnode.inum).context("reading inode for stat")?;

        Ok(Stat {
            inum: fresh.inum,
            size: fresh.size,
            type_: fresh.type_,
            nlinks: fresh.nlinks,
            blocks: fresh.blocks,
        })
    }

    /// Linear scan of the inode table for the first free inode.
    fn find_free_inode(&mut self) -> Result<InodeNumber> {
        for inum in 0..NUM_INODES as InodeNumber {
            if self.read_inode(inum)?.type_ == InodeType::Free {
                return Ok(inum);
            }
        }

        warn!("no more free disk inodes");
        Err(ErrorKind::NoFreeInode.into())
    }

    /// Frees the blocks of `vnode` and marks its inode free.
    fn release_inode(&mut self, vnode: &Vnode) -> Result<()> {
        for &block_number in &vnode.addrs[..vnode.blocks] {
            self.free_block(block_number)?;
        }

        self.write_inode(&FREE_INODE, vnode.inum)
            .with_context(|| format!("freeing inode {}", vnode.inum))
    }
}

impl<S: BlockStorage> VnodeOps for Rfs<S> {
    fn read(&mut self, vnode: &Vnode, buf: &mut [u8], offset: &mut usize) -> Result<usize> {
        self.read_file(vnode, buf, offset)
    }

    fn write(&mut self, vnode: &mut Vnode, data: &[u8], offset: &mut usize) -> Result<usize> {
        self.write_file(vnode, data, offset)
    }

    fn create(&mut self, parent: &mut Vnode, name: &CStr) -> Result<Vnode> {
        self.create_file(parent, name)
    }

    fn lseek(
        &self,
        vnode: &Vnode,
        new_offset: isize,
        whence: Whence,
        offset: &mut usize,
    ) -> Result<()> {
        self.seek(vnode, new_offset, whence, offset)
    }

    fn stat(&mut self, vnode: &Vnode) -> Result<Stat> {
        self.disk_stat(vnode)
    }

    fn lookup(&mut self, parent: &Vnode, name: &CStr) -> Result<Option<Vnode>> {
        self.lookup_entry(parent, name)
    }

    fn write_back(&mut self, vnode: &Vnode) -> Result<()> {
        self.vnode_write_back(vnode)
    }
}
