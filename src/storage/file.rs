use std::fs::File;
use std::os::linux::fs::MetadataExt;
use std::os::unix::prelude::FileExt;

use anyhow::{ensure, Context, Result};

use crate::disk_format::block::{Block, BLOCK_SIZE};
use crate::rfs::BlockNumber;

use super::block_storage::{BlockStorage, ImageMetadata};

/// A disk image file. Block `n` lives at byte `n * BLOCK_SIZE`.
pub struct FileBackedStorage {
    file: File,
    num_blocks: usize,
}

impl FileBackedStorage {
    pub fn new(file: File) -> Result<Self> {
        let len = file.metadata().context("reading disk file metadata")?.len();

        Ok(FileBackedStorage {
            file,
            num_blocks: len as usize / BLOCK_SIZE,
        })
    }
}

impl BlockStorage for FileBackedStorage {
    fn read_block(&self, block_number: BlockNumber) -> Result<Block> {
        ensure!(
            block_number < self.num_blocks,
            "block number out of bounds: {block_number}"
        );

        let mut buf = [0; BLOCK_SIZE];
        let position = block_number * BLOCK_SIZE;

        self.file
            .read_exact_at(&mut buf, position as u64)
            .context("reading requested block")?;

        Ok(buf)
    }

    fn write_block(&mut self, block_number: BlockNumber, block: &Block) -> Result<()> {
        ensure!(
            block_number < self.num_blocks,
            "block number out of bounds: {block_number}"
        );

        let position = block_number * BLOCK_SIZE;

        self.file
            .write_all_at(block, position as u64)
            .context("writing block")?;

        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Creation time falls back to the modification time where the host does not record it.
    fn metadata(&self) -> Result<ImageMetadata> {
        let metadata = self.file.metadata().context("reading disk file metadata")?;
        let mtime = metadata.modified()?;

        Ok(ImageMetadata {
            atime: metadata.accessed()?,
            mtime,
            crtime: metadata.created().unwrap_or(mtime),
            uid: metadata.st_uid(),
            gid: metadata.st_gid(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::SystemTime;

    use super::*;

    fn scratch_image(name: &str, num_blocks: usize) -> (PathBuf, File) {
        let path = std::env::temp_dir().join(format!("rfs-{}-{name}.img", std::process::id()));
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        file.set_len((num_blocks * BLOCK_SIZE) as u64).unwrap();

        (path, file)
    }

    #[test]
    fn test_write_then_read() {
        let (path, file) = scratch_image("write-then-read", 4);
        let mut storage = FileBackedStorage::new(file).unwrap();

        assert_eq!(storage.num_blocks(), 4);

        storage.write_block(3, &[0xcd; BLOCK_SIZE]).unwrap();
        assert_eq!(storage.read_block(3).unwrap(), [0xcd; BLOCK_SIZE]);
        assert_eq!(storage.read_block(2).unwrap(), [0; BLOCK_SIZE]);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_out_of_bounds_block() {
        let (path, file) = scratch_image("out-of-bounds", 2);
        let mut storage = FileBackedStorage::new(file).unwrap();

        assert!(storage.read_block(2).is_err());
        assert!(storage.write_block(2, &[0; BLOCK_SIZE]).is_err());

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_metadata() {
        let (path, file) = scratch_image("metadata", 1);
        let storage = FileBackedStorage::new(file).unwrap();

        let metadata = storage.metadata().unwrap();
        assert!(metadata.mtime > SystemTime::UNIX_EPOCH);

        std::fs::remove_file(path).unwrap();
    }
}
