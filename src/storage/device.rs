use anyhow::{Context, Result};
use log::trace;

use crate::{
    disk_format::block::{Block, EMPTY_BLOCK},
    error::ErrorKind,
    rfs::BlockNumber,
};

use super::block_storage::BlockStorage;

/// Identifies a device in a [`crate::registry::DeviceRegistry`].
pub type DeviceId = usize;

/// A registered block device with its single-block I/O buffer.
///
/// Every transfer goes through the buffer. [`Device::read_block`] lends the buffer out mutably,
/// so its contents can only be used until the next transfer on the same device.
pub struct Device<S: BlockStorage> {
    id: DeviceId,
    name: String,
    storage: S,
    iobuffer: Box<Block>,
}

impl<S: BlockStorage> Device<S> {
    pub fn new(id: DeviceId, name: impl Into<String>, storage: S) -> Self {
        Device {
            id,
            name: name.into(),
            storage,
            iobuffer: Box::new(EMPTY_BLOCK),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn num_blocks(&self) -> usize {
        self.storage.num_blocks()
    }

    /// The I/O buffer, to be filled before a [`Device::write_block`].
    pub fn buffer(&mut self) -> &mut Block {
        &mut *self.iobuffer
    }

    /// Reads block `block_number` into the I/O buffer and lends the buffer out.
    pub fn read_block(&mut self, block_number: BlockNumber) -> Result<&mut Block> {
        trace!("[{}] read block {block_number}", self.name);

        *self.iobuffer = self
            .storage
            .read_block(block_number)
            .with_context(|| format!("reading block {block_number} of {}", self.name))
            .context(ErrorKind::Io)?;

        Ok(&mut *self.iobuffer)
    }

    /// Writes the I/O buffer to block `block_number`.
    pub fn write_block(&mut self, block_number: BlockNumber) -> Result<()> {
        trace!("[{}] write block {block_number}", self.name);

        self.storage
            .write_block(block_number, &self.iobuffer)
            .with_context(|| format!("writing block {block_number} of {}", self.name))
            .context(ErrorKind::Io)
    }

    /// Fills the I/O buffer with `block` and writes it to block `block_number`.
    pub fn write_whole_block(&mut self, block_number: BlockNumber, block: &Block) -> Result<()> {
        *self.iobuffer = *block;
        self.write_block(block_number)
    }
}
