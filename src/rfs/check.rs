use std::collections::{HashMap, HashSet};
use std::ffi::CString;

use anyhow::{bail, Result};
use log::{info, warn};

use crate::{
    disk_format::{
        block::BLOCK_SIZE,
        directory_entry::DIRECTORY_ENTRY_SIZE,
        inode::InodeType,
        layout::{is_data_block, NUM_INODES},
    },
    storage::BlockStorage,
};

use super::{BlockNumber, InodeNumber, Rfs, ROOT_INODE};

impl<S: BlockStorage> Rfs<S> {
    /// Checks the filesystem for consistency. Performs a depth-first traversal of the directory
    /// tree from the root.
    ///
    /// Fails on the first violation found. Allocated blocks that no reachable inode owns are
    /// only reported as warnings.
    pub fn check_filesystem(&mut self) -> Result<()> {
        let root = self.vnode(ROOT_INODE)?;
        if !root.is_dir() {
            bail!("root inode does not represent a directory");
        }

        let mut queue = vec![ROOT_INODE];
        let mut seen_directories = HashSet::<InodeNumber>::new();
        let mut reachable = HashSet::<InodeNumber>::new();
        let mut block_owners = HashMap::<BlockNumber, InodeNumber>::new();

        while let Some(inum) = queue.pop() {
            let vnode = self.vnode(inum)?;
            if vnode.type_ == InodeType::Free {
                bail!("directory tree includes free inode {inum}");
            }

            // an inode linked from several entries is checked once
            if reachable.insert(inum) {
                if vnode.size > vnode.blocks * BLOCK_SIZE {
                    bail!(
                        "inode {inum} doesn't have enough blocks to store {} bytes",
                        vnode.size
                    );
                }

                for &block_number in &vnode.addrs[..vnode.blocks] {
                    if !is_data_block(block_number) {
                        bail!("inode {inum} uses block {block_number} outside the data region");
                    }

                    if !self.is_block_allocated(block_number) {
                        bail!(
                            "inode {inum} uses block {block_number}, which the bitmap marks free"
                        );
                    }

                    if let Some(owner) = block_owners.insert(block_number, inum) {
                        bail!("block {block_number} is used by inodes {owner} and {inum}");
                    }
                }
            }

            if vnode.type_ != InodeType::Directory {
                continue;
            }

            if !seen_directories.insert(inum) {
                bail!("directory tree includes loop");
            }

            if vnode.size % DIRECTORY_ENTRY_SIZE != 0 {
                bail!(
                    "directory size {} is not a multiple of the directory entry size",
                    vnode.size
                );
            }

            let mut entry_names: HashSet<CString> = HashSet::new();
            for entry in self.read_directory(&vnode)? {
                if entry.inum < 0 || entry.inum as usize >= NUM_INODES {
                    bail!("invalid inode number in directory entry: {}", entry.inum);
                }

                if !entry_names.insert(CString::from(&entry.name)) {
                    bail!("directory contains duplicate entry: {}", entry.name);
                }

                queue.push(entry.inum as InodeNumber);
            }
        }

        let leaked = (self.superblock.nblocks as usize)
            .saturating_sub(self.num_free_blocks())
            .saturating_sub(block_owners.len());
        if leaked > 0 {
            warn!("{leaked} allocated blocks are not owned by any reachable inode");
        }

        info!(
            "{} inodes and {} blocks in use",
            reachable.len(),
            block_owners.len()
        );

        Ok(())
    }
}
