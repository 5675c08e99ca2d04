use anyhow::{ensure, Result};
use log::{debug, warn};

use crate::{
    disk_format::{block::BLOCK_SIZE, inode::MAX_FILE_SIZE},
    error::ErrorKind,
    storage::BlockStorage,
    vnode::{Vnode, Whence},
};

use super::{BlockNumber, Rfs};

/// How the byte range `[offset, offset + len)` falls onto the blocks of a file.
#[derive(Debug, PartialEq, Eq)]
struct Extent {
    /// index of the first block touched
    first_block: usize,
    /// offset of the range within its first block
    align: usize,
    /// bytes in the leading partial block; zero when the range starts on a block boundary
    head: usize,
    /// whole blocks after the head
    full_blocks: usize,
    /// bytes in the trailing partial block
    tail: usize,
}

impl Extent {
    fn new(offset: usize, len: usize) -> Self {
        let align = offset % BLOCK_SIZE;
        let head = if align == 0 {
            0
        } else {
            len.min(BLOCK_SIZE - align)
        };
        let rest = len - head;

        Extent {
            first_block: offset / BLOCK_SIZE,
            align,
            head,
            full_blocks: rest / BLOCK_SIZE,
            tail: rest % BLOCK_SIZE,
        }
    }
}

/// The address of the `index`th block of `vnode`, which must already be allocated.
fn block_address(vnode: &Vnode, index: usize) -> Result<BlockNumber> {
    if index >= vnode.blocks {
        return Err(anyhow::Error::new(ErrorKind::Corrupted).context(format!(
            "[inode #{}] block {index} is not allocated ({} blocks for {} bytes)",
            vnode.inum, vnode.blocks, vnode.size
        )));
    }

    Ok(vnode.addrs[index])
}

impl<S: BlockStorage> Rfs<S> {
    /// Reads up to `buf.len()` bytes at `*offset`, clamped to the end of the file, and advances
    /// the offset by the number of bytes read.
    pub fn read_file(&mut self, vnode: &Vnode, buf: &mut [u8], offset: &mut usize) -> Result<usize> {
        check_offset(vnode, *offset)?;

        let len = buf.len().min(vnode.size - *offset);
        debug!("[inode #{}] reading file (offset = {offset}; len = {len})", vnode.inum);

        if len == 0 {
            return Ok(0);
        }

        let extent = Extent::new(*offset, len);
        let mut block_index = extent.first_block;
        let mut copied = 0;

        if extent.head > 0 {
            let block = self.device.read_block(block_address(vnode, block_index)?)?;
            buf[..extent.head].copy_from_slice(&block[extent.align..extent.align + extent.head]);

            copied += extent.head;
            block_index += 1;
        }

        for _ in 0..extent.full_blocks {
            let block = self.device.read_block(block_address(vnode, block_index)?)?;
            buf[copied..copied + BLOCK_SIZE].copy_from_slice(&block[..]);

            copied += BLOCK_SIZE;
            block_index += 1;
        }

        if extent.tail > 0 {
            let block = self.device.read_block(block_address(vnode, block_index)?)?;
            buf[copied..copied + extent.tail].copy_from_slice(&block[..extent.tail]);

            copied += extent.tail;
        }

        debug_assert_eq!(copied, len);
        *offset += len;

        Ok(len)
    }

    /// Writes `data` at `*offset`, allocating blocks as the file grows, and advances the offset.
    ///
    /// The vnode's size and block list are updated in memory only; persist them with
    /// [`Rfs::vnode_write_back`]. Nothing is written when the data would not fit in the file's
    /// direct blocks or in the free blocks left on the device.
    pub fn write_file(&mut self, vnode: &mut Vnode, data: &[u8], offset: &mut usize) -> Result<usize> {
        check_offset(vnode, *offset)?;

        let len = data.len();
        debug!("[inode #{}] writing file (offset = {offset}; len = {len})", vnode.inum);

        if len == 0 {
            return Ok(0);
        }

        let end = *offset + len;
        if end > MAX_FILE_SIZE {
            return Err(anyhow::Error::new(ErrorKind::FileTooLarge).context(format!(
                "[inode #{}] writing up to byte {end}, the limit is {MAX_FILE_SIZE}",
                vnode.inum
            )));
        }

        let new_blocks = end.div_ceil(BLOCK_SIZE).saturating_sub(vnode.blocks);
        if new_blocks > self.num_free_blocks() {
            warn!("[inode #{}] needs {new_blocks} more blocks", vnode.inum);
            return Err(ErrorKind::NoFreeBlock.into());
        }

        let extent = Extent::new(*offset, len);
        let mut block_index = extent.first_block;
        let mut written = 0;

        if extent.head > 0 {
            // the leading block holds bytes before `offset` that must survive
            let block_number = block_address(vnode, block_index)?;
            let block = self.device.read_block(block_number)?;
            block[extent.align..extent.align + extent.head].copy_from_slice(&data[..extent.head]);
            self.device.write_block(block_number)?;

            written += extent.head;
            block_index += 1;
        }

        for _ in 0..extent.full_blocks {
            let (block_number, _) = self.block_for_write(vnode, block_index)?;
            self.device
                .buffer()
                .copy_from_slice(&data[written..written + BLOCK_SIZE]);
            self.device.write_block(block_number)?;

            written += BLOCK_SIZE;
            block_index += 1;
        }

        if extent.tail > 0 {
            let (block_number, fresh) = self.block_for_write(vnode, block_index)?;
            let block = if fresh {
                let block = self.device.buffer();
                block.fill(0);
                block
            } else {
                self.device.read_block(block_number)?
            };
            block[..extent.tail].copy_from_slice(&data[written..written + extent.tail]);
            self.device.write_block(block_number)?;

            written += extent.tail;
        }

        debug_assert_eq!(written, len);
        vnode.size = vnode.size.max(end);
        *offset = end;

        debug!("[inode #{}] wrote {len} bytes", vnode.inum);
        Ok(len)
    }

    /// Moves `*offset` to `new_offset`, absolute or relative to `*offset`. The result must lie
    /// in `[0, size]`; otherwise the offset is left alone.
    pub fn seek(
        &self,
        vnode: &Vnode,
        new_offset: isize,
        whence: Whence,
        offset: &mut usize,
    ) -> Result<()> {
        let target = match whence {
            Whence::Set => Some(new_offset),
            Whence::Cur => isize::try_from(*offset)
                .ok()
                .and_then(|current| current.checked_add(new_offset)),
        };

        match target.and_then(|target| usize::try_from(target).ok()) {
            Some(target) if target <= vnode.size => {
                *offset = target;
                Ok(())
            }
            _ => {
                warn!(
                    "[inode #{}] invalid seek ({whence:?} {new_offset} from {offset}; size = {})",
                    vnode.inum, vnode.size
                );
                Err(ErrorKind::InvalidSeek.into())
            }
        }
    }

    /// The address of the `index`th block of `vnode`, allocating it when `index` is one past the
    /// last allocated block. The flag is `true` for a freshly allocated block.
    fn block_for_write(&mut self, vnode: &mut Vnode, index: usize) -> Result<(BlockNumber, bool)> {
        if index < vnode.blocks {
            return Ok((vnode.addrs[index], false));
        }

        ensure!(index == vnode.blocks, ErrorKind::Corrupted);

        let block_number = self.alloc_block()?;
        vnode.addrs[index] = block_number;
        vnode.blocks += 1;

        Ok((block_number, true))
    }
}

fn check_offset(vnode: &Vnode, offset: usize) -> Result<()> {
    if offset > vnode.size {
        return Err(anyhow::Error::new(ErrorKind::OffsetOutOfBounds).context(format!(
            "[inode #{}] offset {offset} is beyond the file size {}",
            vnode.inum, vnode.size
        )));
    }

    Ok(())
}
