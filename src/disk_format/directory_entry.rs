use std::{
    ffi::{CStr, CString},
    fmt::{self, Debug},
    mem::size_of,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

use super::block::BLOCK_SIZE;

/// The number of bytes occupied by a directory entry.
pub const DIRECTORY_ENTRY_SIZE: usize = 32;
const_assert!(size_of::<DirectoryEntry>() == DIRECTORY_ENTRY_SIZE);

const_assert!(BLOCK_SIZE % DIRECTORY_ENTRY_SIZE == 0);
/// The number of directory entries that fit in a block.
pub const DIRECTORY_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIRECTORY_ENTRY_SIZE;

/// The maximum supported size of a file or directory name, excluding the nul-terminator.
pub const MAX_NAME_LEN: usize = 28;
const_assert!(size_of::<DirectoryEntryName>() == MAX_NAME_LEN);

/// A directory entry.
#[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct DirectoryEntry {
    /// The inode number.
    pub inum: i32,
    /// The name of the entry.
    pub name: DirectoryEntryName,
}

impl DirectoryEntry {
    /// Constructs a new [`DirectoryEntry`] instance.
    pub fn new(inum: i32, name: &CStr) -> Result<DirectoryEntry> {
        Ok(DirectoryEntry {
            inum,
            name: name.try_into()?,
        })
    }

    /// Parses the `index`th entry of a directory data block.
    pub fn from_block(block: &[u8; BLOCK_SIZE], index: usize) -> Result<DirectoryEntry> {
        let start = index * DIRECTORY_ENTRY_SIZE;
        bincode::deserialize(&block[start..start + DIRECTORY_ENTRY_SIZE])
            .context("parsing directory entry")
    }

    /// Serializes the entry into the `index`th entry of a directory data block.
    pub fn to_block(&self, block: &mut [u8; BLOCK_SIZE], index: usize) -> Result<()> {
        let serialized = bincode::serialize(self).context("serializing directory entry")?;

        let start = index * DIRECTORY_ENTRY_SIZE;
        block[start..start + DIRECTORY_ENTRY_SIZE].copy_from_slice(&serialized);

        Ok(())
    }
}

/// A name, as used in [`DirectoryEntry`].
///
/// A maximum of 28-byte-long names are supported. Shorter names are nul-padded; a 28-byte name
/// has no terminator.
#[derive(Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct DirectoryEntryName([u8; MAX_NAME_LEN]);

impl DirectoryEntryName {
    /// Returns whether this name spells `name`.
    pub fn matches(&self, name: &CStr) -> bool {
        CString::from(self).as_c_str() == name
    }
}

impl Debug for DirectoryEntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DirectoryEntryName")
            .field(&CString::from(self))
            .finish()
    }
}

impl TryFrom<&CStr> for DirectoryEntryName {
    type Error = anyhow::Error;

    fn try_from(value: &CStr) -> Result<Self, Self::Error> {
        let bytes = value.to_bytes();

        if bytes.is_empty() || bytes.contains(&b'/') {
            bail!(ErrorKind::InvalidName);
        }

        if bytes.len() > MAX_NAME_LEN {
            return Err(anyhow::Error::new(ErrorKind::NameTooLong)
                .context(format!("name is more than {MAX_NAME_LEN} bytes long")));
        }

        let mut converted = [0; MAX_NAME_LEN];
        converted[0..bytes.len()].copy_from_slice(bytes);

        Ok(DirectoryEntryName(converted))
    }
}

impl From<&DirectoryEntryName> for CString {
    fn from(val: &DirectoryEntryName) -> Self {
        let mut bytes = val.0.to_vec();
        bytes.push(0); // add a nul byte in case there are none

        CString::from(CStr::from_bytes_until_nul(&bytes).expect("we suffixed a nul byte"))
    }
}

impl fmt::Display for DirectoryEntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cstr = CString::from(self);
        write!(f, "{}", cstr.to_string_lossy())
    }
}
