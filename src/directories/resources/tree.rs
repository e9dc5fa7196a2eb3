//! The resource directory: a three-level tree of directory tables (type,
//! name, language) whose leaves are `(data_rva, size, codepage)` entries.

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::buffers::input::InputBufferRef;
use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, FixedLayout, PackedStruct};

pub const SIZEOF_RESOURCE_DIRECTORY_TABLE: usize = 16;
pub const SIZEOF_RESOURCE_DIRECTORY_ENTRY: usize = 8;
pub const SIZEOF_RESOURCE_DATA_ENTRY: usize = 16;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawResourceDirectoryTable {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub number_of_named_entries: u16,
    pub number_of_id_entries: u16,
}

impl_fixed_layout_via_scroll!(RawResourceDirectoryTable, SIZEOF_RESOURCE_DIRECTORY_TABLE);

pub type ResourceDirectoryTable = PackedStruct<RawResourceDirectoryTable>;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawResourceDirectoryEntry {
    pub name_or_id: u32,
    pub offset_to_data_or_subdirectory: u32,
}

impl_fixed_layout_via_scroll!(RawResourceDirectoryEntry, SIZEOF_RESOURCE_DIRECTORY_ENTRY);

pub type ResourceDirectoryEntryRaw = PackedStruct<RawResourceDirectoryEntry>;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawResourceDataEntry {
    pub data_rva: u32,
    pub size: u32,
    pub codepage: u32,
    pub reserved: u32,
}

impl_fixed_layout_via_scroll!(RawResourceDataEntry, SIZEOF_RESOURCE_DATA_ENTRY);

pub type ResourceDataEntryRaw = PackedStruct<RawResourceDataEntry>;

const NAME_FLAG: u32 = 0x8000_0000;
const SUBDIRECTORY_FLAG: u32 = 0x8000_0000;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResourceErrc {
    #[error("unable to read a resource directory table")]
    UnableToReadTable,
    #[error("unable to read a resource directory entry")]
    UnableToReadEntry,
    #[error("unable to read a resource data entry")]
    UnableToReadDataEntry,
    #[error("resource name string is outside the directory")]
    InvalidNameOffset,
    #[error("resource tree depth exceeds the configured limit")]
    DepthExceeded,
}

/// A resource entry's key: either a numeric ID or a UTF-16 name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKey {
    Id(u32),
    Name(String),
}

/// One leaf: the data directory's `(rva, size, codepage)` tuple.
#[derive(Debug, Clone, Copy)]
pub struct ResourceData {
    pub data_rva: u32,
    pub size: u32,
    pub codepage: u32,
}

#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub key: ResourceKey,
    pub children: Vec<ResourceNode>,
    pub data: Option<ResourceData>,
}

/// Walks the three-level type/name/language tree rooted at `pos` within
/// `directory`, stopping with [`ResourceErrc::DepthExceeded`] past
/// `max_depth` levels (the tree is conventionally exactly three deep, but
/// malformed input can claim arbitrary subdirectory offsets).
pub fn parse_resource_directory(directory: &InputBufferRef, pos: u64, max_depth: u32) -> Result<Vec<ResourceNode>, ResourceErrc> {
    parse_level(directory, pos, 0, max_depth)
}

fn parse_level(directory: &InputBufferRef, pos: u64, depth: u32, max_depth: u32) -> Result<Vec<ResourceNode>, ResourceErrc> {
    if depth > max_depth {
        return Err(ResourceErrc::DepthExceeded);
    }
    let table =
        ResourceDirectoryTable::deserialize(directory, pos, false).map_err(|_| ResourceErrc::UnableToReadTable)?;
    let total_entries = table.value.number_of_named_entries as u64 + table.value.number_of_id_entries as u64;

    let mut nodes = Vec::with_capacity(total_entries as usize);
    for i in 0..total_entries {
        let entry_pos = pos + SIZEOF_RESOURCE_DIRECTORY_TABLE as u64 + i * SIZEOF_RESOURCE_DIRECTORY_ENTRY as u64;
        let entry = ResourceDirectoryEntryRaw::deserialize(directory, entry_pos, false).map_err(|_| ResourceErrc::UnableToReadEntry)?;

        let key = if entry.value.name_or_id & NAME_FLAG != 0 {
            ResourceKey::Name(read_resource_name(directory, (entry.value.name_or_id & !NAME_FLAG) as u64)?)
        } else {
            ResourceKey::Id(entry.value.name_or_id)
        };

        let raw_offset = entry.value.offset_to_data_or_subdirectory;
        let (children, data) = if raw_offset & SUBDIRECTORY_FLAG != 0 {
            let sub_pos = (raw_offset & !SUBDIRECTORY_FLAG) as u64;
            (parse_level(directory, sub_pos, depth + 1, max_depth)?, None)
        } else {
            let data_entry = ResourceDataEntryRaw::deserialize(directory, raw_offset as u64, false)
                .map_err(|_| ResourceErrc::UnableToReadDataEntry)?;
            (
                Vec::new(),
                Some(ResourceData {
                    data_rva: data_entry.value.data_rva,
                    size: data_entry.value.size,
                    codepage: data_entry.value.codepage,
                }),
            )
        };

        nodes.push(ResourceNode { key, children, data });
    }
    Ok(nodes)
}

/// A resource name entry: a `u16` UTF-16 code-unit count followed by that
/// many code units, no terminator.
fn read_resource_name(directory: &InputBufferRef, pos: u64) -> Result<String, ResourceErrc> {
    let mut len_bytes = [0u8; 2];
    if directory.read(pos, &mut len_bytes) < 2 {
        return Err(ResourceErrc::InvalidNameOffset);
    }
    let len = u16::from_le_bytes(len_bytes) as usize;
    let mut units = vec![0u8; len * 2];
    if directory.read(pos + 2, &mut units) < units.len() {
        return Err(ResourceErrc::InvalidNameOffset);
    }
    let units: Vec<u16> = units.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    Ok(String::from_utf16_lossy(&units))
}
