/// Perform a const assertion.
macro_rules! const_assert {
    ($($tt:tt)*) => {
        const _: () = assert!($($tt)*);
    }
}

/// RFS blocks.
pub mod block;
/// The free-block bitmap block.
pub mod bitmap;
/// Directory entries and entry names.
pub mod directory_entry;
/// Inodes.
pub mod inode;
/// The partition of the ramdisk into regions.
pub mod layout;
/// The superblock.
pub mod superblock;
