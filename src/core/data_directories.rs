//! The data directory array: up to 16 `(rva, size)` pairs, indexed by a
//! closed enumeration.

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, FixedLayout, PackedStruct};

pub const SIZEOF_DATA_DIRECTORY: usize = 8;
pub const MAX_DATA_DIRECTORIES: usize = 16;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawDataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl_fixed_layout_via_scroll!(RawDataDirectory, SIZEOF_DATA_DIRECTORY);

pub type DataDirectory = PackedStruct<RawDataDirectory>;

/// The closed enumeration of data directory slots, in on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum DirectoryEntry {
    Export = 0,
    Import = 1,
    Resource = 2,
    Exception = 3,
    Security = 4,
    BaseReloc = 5,
    Debug = 6,
    Architecture = 7,
    GlobalPtr = 8,
    Tls = 9,
    LoadConfig = 10,
    BoundImport = 11,
    Iat = 12,
    DelayImport = 13,
    ComDescriptor = 14,
    Reserved = 15,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DataDirectoriesErrc {
    #[error("unable to read a data directory entry")]
    UnableToRead,
    #[error("number_of_rva_and_sizes exceeds the 16-entry maximum")]
    TooManyEntries,
}

#[derive(Debug, Clone, Default)]
pub struct DataDirectories {
    entries: Vec<DataDirectory>,
}

impl DataDirectories {
    /// Deserializes `min(count, 16)` entries.
    pub fn deserialize(
        buffer: &crate::buffers::InputBuffer,
        pos: u64,
        count: u32,
        allow_virtual: bool,
    ) -> Result<Self, crate::error::UtilError> {
        let n = (count as usize).min(MAX_DATA_DIRECTORIES);
        let mut entries = Vec::with_capacity(n);
        for i in 0..n {
            entries.push(DataDirectory::deserialize(
                buffer,
                pos + (i * SIZEOF_DATA_DIRECTORY) as u64,
                allow_virtual,
            )?);
        }
        Ok(DataDirectories { entries })
    }

    pub fn get(&self, entry: DirectoryEntry) -> Option<&DataDirectory> {
        self.entries.get(entry as usize).filter(|d| d.value.virtual_address != 0 || d.value.size != 0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataDirectory> {
        self.entries.iter()
    }

    pub fn serialize(&self, write_virtual_part: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * SIZEOF_DATA_DIRECTORY);
        for e in &self.entries {
            out.extend_from_slice(&e.serialize(write_virtual_part));
        }
        out
    }
}
