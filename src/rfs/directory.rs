use std::ffi::CStr;

use anyhow::{ensure, Context, Result};
use log::{info, warn};

use crate::{
    disk_format::{
        block::BLOCK_SIZE,
        directory_entry::{
            DirectoryEntry, DirectoryEntryName, DIRECTORY_ENTRIES_PER_BLOCK, DIRECTORY_ENTRY_SIZE,
        },
        inode::{Inode, InodeType, FREE_INODE},
    },
    error::ErrorKind,
    storage::BlockStorage,
    vnode::Vnode,
};

use super::{BlockNumber, InodeNumber, Rfs};

impl<S: BlockStorage> Rfs<S> {
    /// Looks up `name` among the entries of `parent`. A missing name is not an error.
    pub fn lookup_entry(&mut self, parent: &Vnode, name: &CStr) -> Result<Option<Vnode>> {
        ensure!(parent.is_dir(), ErrorKind::NotADirectory);

        match self.find_entry(parent, name)? {
            Some((_, entry)) => {
                let vnode = self
                    .vnode(entry.inum as InodeNumber)
                    .with_context(|| format!("reading inode of entry {name:?}"))?;

                Ok(Some(vnode))
            }
            None => Ok(None),
        }
    }

    /// Every entry of `dir`, in storage order.
    pub fn read_directory(&mut self, dir: &Vnode) -> Result<Vec<DirectoryEntry>> {
        ensure!(dir.is_dir(), ErrorKind::NotADirectory);

        let mut entries = Vec::with_capacity(dir.size / DIRECTORY_ENTRY_SIZE);
        self.scan_entries(dir, |_, entry| {
            entries.push(entry);
            false
        })?;

        Ok(entries)
    }

    /// Appends an entry to `parent` and writes the parent back.
    ///
    /// Entries are only ever placed in blocks the directory already owns; a directory does not
    /// grow past its allocation.
    pub fn add_direntry(&mut self, parent: &mut Vnode, name: &CStr, inum: InodeNumber) -> Result<()> {
        ensure!(parent.is_dir(), ErrorKind::NotADirectory);

        let entry = DirectoryEntry::new(inum as i32, name)?;
        let block_number = self.entry_block(parent)?;

        let block = self.device.read_block(block_number)?;
        entry.to_block(block, (parent.size % BLOCK_SIZE) / DIRECTORY_ENTRY_SIZE)?;
        self.device.write_block(block_number)?;

        parent.size += DIRECTORY_ENTRY_SIZE;
        self.vnode_write_back(parent)
            .context("writing back parent directory")
    }

    /// Creates an empty regular file called `name` in `parent`.
    pub fn create_file(&mut self, parent: &mut Vnode, name: &CStr) -> Result<Vnode> {
        self.create_inode(parent, name, InodeType::File)
    }

    /// Creates an empty directory called `name` in `parent`.
    pub fn create_directory(&mut self, parent: &mut Vnode, name: &CStr) -> Result<Vnode> {
        self.create_inode(parent, name, InodeType::Directory)
    }

    /// Removes the entry `name` of a regular file from `parent`. The file is released once its
    /// last link is gone.
    pub fn remove_file(&mut self, parent: &mut Vnode, name: &CStr) -> Result<()> {
        ensure!(parent.is_dir(), ErrorKind::NotADirectory);

        let (index, entry) = self
            .find_entry(parent, name)?
            .ok_or(ErrorKind::NotFound)
            .with_context(|| format!("unlinking {name:?}"))?;

        let mut vnode = self.vnode(entry.inum as InodeNumber)?;
        ensure!(!vnode.is_dir(), ErrorKind::IsADirectory);

        self.remove_entry(parent, index)?;

        vnode.nlinks = vnode.nlinks.saturating_sub(1);
        if vnode.nlinks == 0 {
            self.release_inode(&vnode)?;
            info!("[inode #{}] released", vnode.inum);
        } else {
            self.vnode_write_back(&vnode)?;
        }

        Ok(())
    }

    fn create_inode(&mut self, parent: &mut Vnode, name: &CStr, type_: InodeType) -> Result<Vnode> {
        ensure!(parent.is_dir(), ErrorKind::NotADirectory);

        DirectoryEntryName::try_from(name)?;
        if self.find_entry(parent, name)?.is_some() {
            return Err(anyhow::Error::new(ErrorKind::AlreadyExists)
                .context(format!("entry already exists: {name:?}")));
        }
        self.entry_block(parent)?;

        let inum = self.find_free_inode()?;
        let block_number = self.alloc_block()?;

        let vnode = match self.link_inode(parent, name, inum, type_, block_number) {
            Ok(vnode) => vnode,
            Err(err) => {
                self.abandon_inode(inum, block_number);
                return Err(err.context(format!("linking {name:?} into its parent")));
            }
        };

        info!("[inode #{inum}] created {type_:?} {name:?} in inode #{}", parent.inum);
        Ok(vnode)
    }

    /// Writes the new inode and enters it into `parent`.
    fn link_inode(
        &mut self,
        parent: &mut Vnode,
        name: &CStr,
        inum: InodeNumber,
        type_: InodeType,
        block_number: BlockNumber,
    ) -> Result<Vnode> {
        let inode = Inode::new(type_, &[block_number as i32]);
        self.write_inode(&inode, inum)?;

        let vnode = self.vnode(inum)?;
        self.add_direntry(parent, name, inum)?;

        Ok(vnode)
    }

    /// Undoes the allocations of a create that could not be linked.
    fn abandon_inode(&mut self, inum: InodeNumber, block_number: BlockNumber) {
        if let Err(err) = self.free_block(block_number) {
            warn!("failed to free block {block_number} after a failed create: {err:#}");
        }

        if let Err(err) = self.write_inode(&FREE_INODE, inum) {
            warn!("failed to free inode {inum} after a failed create: {err:#}");
        }
    }

    /// The block that would receive the next entry of `dir`.
    fn entry_block(&self, dir: &Vnode) -> Result<usize> {
        let index = dir.size / BLOCK_SIZE;
        if index >= dir.blocks {
            return Err(anyhow::Error::new(ErrorKind::DirectoryFull)
                .context(format!("directory inode #{} has no room for another entry", dir.inum)));
        }

        Ok(dir.addrs[index])
    }

    fn find_entry(&mut self, dir: &Vnode, name: &CStr) -> Result<Option<(usize, DirectoryEntry)>> {
        let mut found = None;
        self.scan_entries(dir, |index, entry| {
            if entry.name.matches(name) {
                found = Some((index, entry));
                return true;
            }

            false
        })?;

        Ok(found)
    }

    /// Feeds the entries of `dir` to `visit` in order, one data block read at a time, until
    /// `visit` returns `true`.
    fn scan_entries<F>(&mut self, dir: &Vnode, mut visit: F) -> Result<()>
    where
        F: FnMut(usize, DirectoryEntry) -> bool,
    {
        if dir.size % DIRECTORY_ENTRY_SIZE != 0 {
            return Err(anyhow::Error::new(ErrorKind::Corrupted).context(format!(
                "directory size {} is not a multiple of {DIRECTORY_ENTRY_SIZE}",
                dir.size
            )));
        }

        let total_entries = dir.size / DIRECTORY_ENTRY_SIZE;

        let mut block = None;
        for index in 0..total_entries {
            if index % DIRECTORY_ENTRIES_PER_BLOCK == 0 {
                let block_index = index / DIRECTORY_ENTRIES_PER_BLOCK;
                ensure!(block_index < dir.blocks, ErrorKind::Corrupted);

                block = Some(*self.device.read_block(dir.addrs[block_index])?);
            }

            let block = block
                .as_ref()
                .expect("entry 0 of every block loads the block");

            let entry = DirectoryEntry::from_block(block, index % DIRECTORY_ENTRIES_PER_BLOCK)?;
            if visit(index, entry) {
                break;
            }
        }

        Ok(())
    }

    /// Fills the hole at `index` with the last entry and shrinks `dir` by one entry.
    fn remove_entry(&mut self, dir: &mut Vnode, index: usize) -> Result<()> {
        let last = dir.size / DIRECTORY_ENTRY_SIZE - 1;

        if index != last {
            let last_block_number = dir.addrs[last / DIRECTORY_ENTRIES_PER_BLOCK];
            let block = self.device.read_block(last_block_number)?;
            let moved = DirectoryEntry::from_block(block, last % DIRECTORY_ENTRIES_PER_BLOCK)?;

            let block_number = dir.addrs[index / DIRECTORY_ENTRIES_PER_BLOCK];
            let block = self.device.read_block(block_number)?;
            moved.to_block(block, index % DIRECTORY_ENTRIES_PER_BLOCK)?;
            self.device.write_block(block_number)?;
        }

        dir.size -= DIRECTORY_ENTRY_SIZE;
        self.vnode_write_back(dir)
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use crate::{
        disk_format::{
            directory_entry::MAX_NAME_LEN,
            layout::{DATA_BLOCK_START, NUM_INODES},
        },
        error::error_kind,
        format::format,
        rfs::ROOT_INODE,
        storage::{Device, FlakyDisk, RamDisk},
    };

    use super::*;

    fn formatted() -> Rfs<RamDisk> {
        let mut device = Device::new(0, "ramdisk0", RamDisk::default());
        format(&mut device).unwrap();
        Rfs::mount(device).unwrap()
    }

    fn name(i: usize) -> CString {
        CString::new(format!("f{i}")).unwrap()
    }

    mod lookup {
        use super::*;

        #[test]
        fn test_missing_name_on_fresh_device() {
            let mut rfs = formatted();
            let root = rfs.root().unwrap();

            assert_eq!(rfs.lookup_entry(&root, c"missing").unwrap(), None);
        }

        #[test]
        fn test_after_create() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();

            let created = rfs.create_file(&mut root, c"x").unwrap();
            let found = rfs.lookup_entry(&root, c"x").unwrap().unwrap();

            assert_eq!(found.inum, created.inum);
            assert_eq!(found, created);
        }

        #[test]
        fn test_non_directory_parent() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();
            let file = rfs.create_file(&mut root, c"x").unwrap();

            let err = rfs.lookup_entry(&file, c"y").unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::NotADirectory));
        }

        #[test]
        fn test_exact_name_match() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();
            rfs.create_file(&mut root, c"logfile").unwrap();

            assert_eq!(rfs.lookup_entry(&root, c"log").unwrap(), None);
        }

        #[test]
        fn test_entry_in_second_block() {
            let mut rfs = formatted();
            let mut dir = rfs.root().unwrap();

            // a directory spanning two blocks, with the entries laid out by hand
            let second_block = rfs.alloc_block().unwrap();
            dir.addrs[1] = second_block;
            dir.blocks = 2;

            let entry = DirectoryEntry::new(7, c"far").unwrap();
            let block = rfs.device.read_block(second_block).unwrap();
            entry.to_block(block, 0).unwrap();
            rfs.device.write_block(second_block).unwrap();

            dir.size = (DIRECTORY_ENTRIES_PER_BLOCK + 1) * DIRECTORY_ENTRY_SIZE;

            let mut far = Vnode::new(7);
            far.type_ = InodeType::File;
            far.nlinks = 1;
            rfs.vnode_write_back(&far).unwrap();

            let found = rfs.lookup_entry(&dir, c"far").unwrap().unwrap();
            assert_eq!(found.inum, 7);
        }
    }

    mod create {
        use super::*;

        #[test]
        fn test_inode_fields() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();

            let file = rfs.create_file(&mut root, c"x").unwrap();
            assert_eq!(file.inum, 1);
            assert_eq!(file.type_, InodeType::File);
            assert_eq!(file.size, 0);
            assert_eq!(file.nlinks, 1);
            assert_eq!(file.blocks, 1);
            assert_eq!(file.addrs[0], DATA_BLOCK_START + 1);
            assert!(rfs.is_block_allocated(file.addrs[0]));
        }

        #[test]
        fn test_parent_grows_by_one_entry() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();

            rfs.create_file(&mut root, c"a").unwrap();
            rfs.create_file(&mut root, c"b").unwrap();

            assert_eq!(root.size, 2 * DIRECTORY_ENTRY_SIZE);
            assert_eq!(rfs.root().unwrap().size, 2 * DIRECTORY_ENTRY_SIZE);
        }

        #[test]
        fn test_nested_child() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();

            let mut dir = rfs.create_directory(&mut root, c"dir").unwrap();
            assert!(dir.is_dir());

            let child = rfs.create_file(&mut dir, c"child").unwrap();
            let found = rfs.lookup_entry(&dir, c"child").unwrap().unwrap();
            assert_eq!(found.inum, child.inum);

            assert_eq!(rfs.lookup_entry(&root, c"child").unwrap(), None);
        }

        #[test]
        fn test_non_directory_parent() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();
            let mut file = rfs.create_file(&mut root, c"x").unwrap();
            let free_blocks = rfs.num_free_blocks();

            let err = rfs.create_file(&mut file, c"y").unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::NotADirectory));
            assert_eq!(rfs.num_free_blocks(), free_blocks);
        }

        #[test]
        fn test_duplicate_name() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();
            rfs.create_file(&mut root, c"x").unwrap();

            let err = rfs.create_file(&mut root, c"x").unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::AlreadyExists));
            assert_eq!(root.size, DIRECTORY_ENTRY_SIZE);
        }

        #[test]
        fn test_name_too_long() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();
            let long = CString::new([b'n'; MAX_NAME_LEN + 1]).unwrap();

            let err = rfs.create_file(&mut root, &long).unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::NameTooLong));
        }

        #[test]
        fn test_directory_full() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();

            for i in 0..DIRECTORY_ENTRIES_PER_BLOCK {
                rfs.create_file(&mut root, &name(i)).unwrap();
            }
            let free_blocks = rfs.num_free_blocks();
            let free_inodes = rfs.num_free_inodes().unwrap();

            let err = rfs.create_file(&mut root, c"overflow").unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::DirectoryFull));
            assert!(!error_kind(&err).unwrap().is_fatal());

            assert_eq!(rfs.num_free_blocks(), free_blocks);
            assert_eq!(rfs.num_free_inodes().unwrap(), free_inodes);
        }

        #[test]
        fn test_no_more_inodes() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();

            // fill the inode table by hand, leaving the root directory with room to spare
            for inum in 1..NUM_INODES as InodeNumber {
                rfs.write_inode(&Inode::new(InodeType::File, &[]), inum)
                    .unwrap();
            }

            let err = rfs.create_file(&mut root, c"x").unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::NoFreeInode));
            assert!(error_kind(&err).unwrap().is_fatal());
        }

        #[test]
        fn test_failed_inode_write_releases_allocations() {
            let (disk, fail_writes) = FlakyDisk::new();
            let mut device = Device::new(0, "flaky0", disk);
            format(&mut device).unwrap();
            let mut rfs = Rfs::mount(device).unwrap();
            let mut root = rfs.root().unwrap();
            let free_blocks = rfs.num_free_blocks();

            fail_writes.set(true);
            let err = rfs.create_file(&mut root, c"x").unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::Io));
            assert_eq!(rfs.num_free_blocks(), free_blocks);
            assert_eq!(root.size, 0);

            fail_writes.set(false);
            assert_eq!(rfs.num_free_inodes().unwrap(), NUM_INODES - 1);

            let file = rfs.create_file(&mut root, c"x").unwrap();
            assert_eq!(file.inum, 1);
            assert_eq!(file.addrs[0], DATA_BLOCK_START + 1);
        }

        #[test]
        fn test_reuses_first_free_inode() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();

            rfs.create_file(&mut root, c"a").unwrap();
            let b = rfs.create_file(&mut root, c"b").unwrap();
            rfs.create_file(&mut root, c"c").unwrap();
            rfs.remove_file(&mut root, c"b").unwrap();

            let d = rfs.create_file(&mut root, c"d").unwrap();
            assert_eq!(d.inum, b.inum);
        }
    }

    mod read_directory {
        use super::*;

        #[test]
        fn test_entries_in_order() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();

            for i in 0..3 {
                rfs.create_file(&mut root, &name(i)).unwrap();
            }

            let names = rfs
                .read_directory(&root)
                .unwrap()
                .iter()
                .map(|entry| entry.name.to_string())
                .collect::<Vec<_>>();
            assert_eq!(names, ["f0", "f1", "f2"]);
        }

        #[test]
        fn test_fresh_root_is_empty() {
            let mut rfs = formatted();
            let root = rfs.root().unwrap();

            assert!(rfs.read_directory(&root).unwrap().is_empty());
            assert_eq!(root.inum, ROOT_INODE);
        }
    }

    mod remove_file {
        use super::*;

        #[test]
        fn test_removes_entry() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();
            rfs.create_file(&mut root, c"a").unwrap();
            rfs.create_file(&mut root, c"b").unwrap();
            rfs.create_file(&mut root, c"c").unwrap();

            rfs.remove_file(&mut root, c"a").unwrap();

            assert_eq!(root.size, 2 * DIRECTORY_ENTRY_SIZE);
            assert_eq!(rfs.lookup_entry(&root, c"a").unwrap(), None);
            assert!(rfs.lookup_entry(&root, c"b").unwrap().is_some());
            assert!(rfs.lookup_entry(&root, c"c").unwrap().is_some());
        }

        #[test]
        fn test_frees_inode_and_blocks() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();
            let free_blocks = rfs.num_free_blocks();

            let file = rfs.create_file(&mut root, c"a").unwrap();
            rfs.remove_file(&mut root, c"a").unwrap();

            assert_eq!(rfs.num_free_blocks(), free_blocks);
            assert!(!rfs.is_block_allocated(file.addrs[0]));
            assert_eq!(rfs.read_inode(file.inum).unwrap().type_, InodeType::Free);
        }

        #[test]
        fn test_non_existent_entry() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();

            let err = rfs.remove_file(&mut root, c"ghost").unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));
        }

        #[test]
        fn test_directory() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();
            rfs.create_directory(&mut root, c"dir").unwrap();

            let err = rfs.remove_file(&mut root, c"dir").unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::IsADirectory));
            assert!(rfs.lookup_entry(&root, c"dir").unwrap().is_some());
        }

        #[test]
        fn test_file_with_other_links_survives() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();
            let file = rfs.create_file(&mut root, c"a").unwrap();
            rfs.add_direntry(&mut root, c"alias", file.inum).unwrap();

            let mut linked = file.clone();
            linked.nlinks = 2;
            rfs.vnode_write_back(&linked).unwrap();

            rfs.remove_file(&mut root, c"a").unwrap();

            let alias = rfs.lookup_entry(&root, c"alias").unwrap().unwrap();
            assert_eq!(alias.nlinks, 1);
            assert_eq!(alias.type_, InodeType::File);
            assert!(rfs.is_block_allocated(file.addrs[0]));
        }
    }

    mod add_direntry {
        use super::*;

        #[test]
        fn test_non_directory_parent() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();
            let mut file = rfs.create_file(&mut root, c"x").unwrap();

            let err = rfs.add_direntry(&mut file, c"y", 1).unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::NotADirectory));
            assert_eq!(file.size, 0);
        }

        #[test]
        fn test_persists_parent_size() {
            let mut rfs = formatted();
            let mut root = rfs.root().unwrap();

            rfs.add_direntry(&mut root, c"y", 3).unwrap();

            assert_eq!(rfs.read_inode(ROOT_INODE).unwrap().size, DIRECTORY_ENTRY_SIZE as i32);
        }
    }
}
