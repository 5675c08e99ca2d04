use std::ffi::{CStr, CString, OsStr};
use std::ops::ControlFlow;
use std::os::unix::ffi::OsStrExt;
use std::time::Duration;

use anyhow::{anyhow, Result};
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};
use libc::{c_int, EEXIST, EFBIG, EINVAL, EIO, EISDIR, ENAMETOOLONG, ENOENT, ENOSPC, ENOTDIR};
use log::{error, warn};

use crate::{
    disk_format::{
        block::BLOCK_SIZE,
        directory_entry::{DirectoryEntry, MAX_NAME_LEN},
        inode::InodeType,
        layout::NUM_INODES,
    },
    error::{error_kind, ErrorKind},
    rfs::{InodeNumber, Rfs},
    storage::BlockStorage,
    vnode::{Vnode, VnodeOps},
};

/// Exposes a mounted [`Rfs`] through FUSE, standing in for the VFS layer.
///
/// FUSE reserves inode number 1 for the root, so FUSE inode numbers are RFS inode numbers plus
/// one.
pub struct RfsFs<S: BlockStorage> {
    rfs: Rfs<S>,
    first_free_handle: u64,
}

impl<S: BlockStorage> RfsFs<S> {
    const TTL: Duration = Duration::new(1, 0);
    const GENERATION: u64 = 1;

    pub fn new(rfs: Rfs<S>) -> RfsFs<S> {
        RfsFs {
            rfs,
            first_free_handle: 0,
        }
    }

    fn vnode(&mut self, ino: u64) -> Result<Vnode> {
        let inum = ino
            .checked_sub(1)
            .and_then(|inum| InodeNumber::try_from(inum).ok())
            .ok_or(anyhow!("invalid inode number: {ino}"))?;

        self.rfs.vnode(inum)
    }

    /// Sets permissions to 755.
    fn get_attributes(&mut self, vnode: &Vnode) -> Result<Option<FileAttr>> {
        let stat = self.rfs.stat(vnode)?;

        let kind = match stat.type_ {
            InodeType::Directory => FileType::Directory,
            InodeType::File => FileType::RegularFile,
            InodeType::Free => return Ok(None),
        };

        let metadata = self.rfs.device().storage().metadata().unwrap_or_default();

        Ok(Some(FileAttr {
            ino: stat.inum as u64 + 1,
            size: stat.size as u64,
            blocks: stat.blocks as u64,
            atime: metadata.atime,
            mtime: metadata.mtime,
            ctime: metadata.mtime,
            crtime: metadata.crtime,
            kind,
            perm: 0o755,
            nlink: stat.nlinks,
            uid: metadata.uid,
            gid: metadata.gid,
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE as u32,
        }))
    }

    fn attributes_of(&mut self, vnode: &Vnode) -> Result<FileAttr> {
        self.get_attributes(vnode)?
            .ok_or(anyhow!("inode {} is free", vnode.inum))
    }

    fn lookup_entry(&mut self, parent: u64, name: &CStr) -> Result<FileAttr> {
        let parent = self.vnode(parent)?;
        let vnode = self
            .rfs
            .lookup(&parent, name)?
            .ok_or(ErrorKind::NotFound)?;

        self.attributes_of(&vnode)
    }

    fn read_file(&mut self, ino: u64, offset: usize, size: usize) -> Result<Vec<u8>> {
        let vnode = self.vnode(ino)?;
        if offset >= vnode.size {
            return Ok(vec![]);
        }

        let mut data = vec![0; size];
        let mut offset = offset;
        let len = self.rfs.read(&vnode, &mut data, &mut offset)?;
        data.truncate(len);

        Ok(data)
    }

    fn write_file(&mut self, ino: u64, offset: usize, data: &[u8]) -> Result<u32> {
        let mut vnode = self.vnode(ino)?;

        let mut offset = offset;
        let write_len = self.rfs.write(&mut vnode, data, &mut offset)?;
        self.rfs.write_back(&vnode)?;

        Ok(write_len as u32)
    }

    fn read_directory(&mut self, ino: u64) -> Result<Vec<(DirectoryEntry, InodeType)>> {
        let dir = self.vnode(ino)?;
        let mut directory_contents = vec![];

        // this can't be a `filter_map` because of the potential error in reading the inode
        for entry in self.rfs.read_directory(&dir)? {
            let entry_inode = self.rfs.read_inode(entry.inum as InodeNumber)?;

            if entry_inode.type_ == InodeType::Free {
                warn!("directory includes free entry: {}", entry.name);
                continue;
            }

            directory_contents.push((entry, entry_inode.type_));
        }

        Ok(directory_contents)
    }

    fn create_file(&mut self, parent: u64, name: &CStr) -> Result<FileAttr> {
        let mut parent = self.vnode(parent)?;
        let vnode = self.rfs.create(&mut parent, name)?;

        self.attributes_of(&vnode)
    }

    fn create_directory(&mut self, parent: u64, name: &CStr) -> Result<FileAttr> {
        let mut parent = self.vnode(parent)?;
        let vnode = self.rfs.create_directory(&mut parent, name)?;

        self.attributes_of(&vnode)
    }

    fn remove_file(&mut self, parent: u64, name: &CStr) -> Result<()> {
        let mut parent = self.vnode(parent)?;
        self.rfs.remove_file(&mut parent, name)
    }

    fn assign_file_handle(&mut self) -> u64 {
        let assigned = self.first_free_handle;
        self.first_free_handle += 1;

        assigned
    }
}

/// The errno reported to the kernel for `err`.
fn errno(err: &anyhow::Error) -> c_int {
    match error_kind(err) {
        Some(ErrorKind::NotFound) => ENOENT,
        Some(ErrorKind::AlreadyExists) => EEXIST,
        Some(ErrorKind::NotADirectory) => ENOTDIR,
        Some(ErrorKind::IsADirectory) => EISDIR,
        Some(ErrorKind::NameTooLong) => ENAMETOOLONG,
        Some(ErrorKind::FileTooLarge) => EFBIG,
        Some(ErrorKind::DirectoryFull | ErrorKind::NoFreeBlock | ErrorKind::NoFreeInode) => ENOSPC,
        Some(ErrorKind::InvalidName | ErrorKind::InvalidSeek | ErrorKind::OffsetOutOfBounds) => {
            EINVAL
        }
        Some(kind) if kind.is_fatal() => {
            error!("fatal file system error: {err:#}");
            EIO
        }
        _ => EIO,
    }
}

impl<S: BlockStorage> Filesystem for RfsFs<S> {
    fn destroy(&mut self) {
        if let Err(err) = self.rfs.sync() {
            error!("failed to sync on unmount: {err:#}");
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let num_free_blocks = self.rfs.num_free_blocks();
        let Ok(num_free_inodes) = self.rfs.num_free_inodes() else {
            reply.error(EIO);
            return;
        };

        reply.statfs(
            self.rfs.superblock().size as u64,
            num_free_blocks as u64,
            num_free_blocks as u64,
            NUM_INODES as u64,
            num_free_inodes as u64,
            BLOCK_SIZE as u32,
            MAX_NAME_LEN as u32,
            BLOCK_SIZE as u32,
        );
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Ok(name) = CString::new(name.as_bytes()) else {
            reply.error(EINVAL);
            return;
        };

        match self.lookup_entry(parent, &name) {
            Ok(attr) => reply.entry(&Self::TTL, &attr, Self::GENERATION),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, _ino: u64, flags: i32, reply: ReplyOpen) {
        let handle = self.assign_file_handle();
        reply.opened(handle, flags as u32);
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, flags: i32, reply: ReplyOpen) {
        let handle = self.assign_file_handle();
        reply.opened(handle, flags as u32);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.vnode(ino).and_then(|vnode| self.attributes_of(&vnode)) {
            Ok(attr) => reply.attr(&Self::TTL, &attr),
            Err(err) => reply.error(errno(&err)),
        }
    }

    /// Only accepts a size equal to the current one; RFS cannot truncate.
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let vnode = match self.vnode(ino) {
            Ok(vnode) => vnode,
            Err(err) => {
                reply.error(errno(&err));
                return;
            }
        };

        if size.is_some_and(|size| size != vnode.size as u64) {
            reply.error(EINVAL);
            return;
        }

        match self.attributes_of(&vnode) {
            Ok(attr) => reply.attr(&Self::TTL, &attr),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_file(ino, offset as usize, size as usize) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.read_directory(ino) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(errno(&err));
                return;
            }
        };

        let offset = offset as usize;
        let _ = entries
            .into_iter()
            .enumerate()
            .skip(offset)
            .try_for_each(|(i, (entry, inode_type))| {
                let file_type = match inode_type {
                    InodeType::Directory => FileType::Directory,
                    InodeType::File => FileType::RegularFile,
                    InodeType::Free => {
                        unreachable!("we filtered these in `self.read_directory`")
                    }
                };

                let is_buffer_full = reply.add(
                    entry.inum as u64 + 1,
                    (i + 1) as i64,
                    file_type,
                    entry.name.to_string(),
                );

                if is_buffer_full {
                    return ControlFlow::Break(());
                }

                ControlFlow::Continue(())
            });

        reply.ok();
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.write_file(ino, offset as usize, data) {
            Ok(write_len) => reply.written(write_len),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Ok(name) = CString::new(name.as_bytes()) else {
            reply.error(EINVAL);
            return;
        };

        match self.create_file(parent, &name) {
            Ok(attr) => reply.created(
                &Self::TTL,
                &attr,
                Self::GENERATION,
                self.assign_file_handle(),
                flags as u32,
            ),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Ok(name) = CString::new(name.as_bytes()) else {
            reply.error(EINVAL);
            return;
        };

        match self.create_directory(parent, &name) {
            Ok(attr) => reply.entry(&Self::TTL, &attr, Self::GENERATION),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Ok(name) = CString::new(name.as_bytes()) else {
            reply.error(EINVAL);
            return;
        };

        match self.remove_file(parent, &name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }
}
