/// The block storage abstraction.
mod block_storage;
/// Registered devices and their I/O buffer.
mod device;
/// File-backed storage.
mod file;
/// Storage with switchable write failures.
#[cfg(test)]
mod flaky;
/// Memory-backed storage.
mod ramdisk;

pub use block_storage::*;
pub use device::*;
pub use file::*;
#[cfg(test)]
pub use flaky::*;
pub use ramdisk::*;
