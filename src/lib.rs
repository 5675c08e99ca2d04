pub mod allocator;
pub mod disk_format;
pub mod error;
pub mod format;
pub mod fuse;
mod inode_store;
pub mod registry;
pub mod rfs;
pub mod storage;
pub mod vnode;
