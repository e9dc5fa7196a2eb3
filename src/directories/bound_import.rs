//! The bound-import directory: a zero-terminated array of descriptors, each
//! naming the DLL it was bound against.

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::buffers::input::InputBuffer;
use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, FixedLayout, PackedStruct};

pub const SIZEOF_BOUND_IMPORT_DESCRIPTOR: usize = 8;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawBoundImportDescriptor {
    pub time_date_stamp: u32,
    pub offset_module_name: u16,
    pub number_of_module_forwarder_refs: u16,
}

impl_fixed_layout_via_scroll!(RawBoundImportDescriptor, SIZEOF_BOUND_IMPORT_DESCRIPTOR);

pub type BoundImportDescriptor = PackedStruct<RawBoundImportDescriptor>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BoundImportErrc {
    #[error("unable to read a bound-import descriptor")]
    UnableToReadDescriptor,
    #[error("offset_module_name is outside the directory")]
    InvalidNameOffset,
}

#[derive(Debug, Clone)]
pub struct BoundImportEntry {
    pub descriptor: BoundImportDescriptor,
    pub module_name: String,
    pub forwarders: Vec<BoundImportForwarder>,
}

#[derive(Debug, Clone)]
pub struct BoundImportForwarder {
    pub time_date_stamp: u32,
    pub offset_module_name: u16,
    pub module_name: String,
}

/// Walks the directory until a zero descriptor (or the directory's own
/// `size` bound) is reached, resolving each `offset_module_name` against
/// the directory's own bytes (not the RVA space).
pub fn parse_bound_import_directory(buffer: &InputBuffer, pos: u64, size: u32) -> Result<Vec<BoundImportEntry>, BoundImportErrc> {
    let end = pos + size as u64;
    let mut offset = pos;
    let mut entries = Vec::new();

    while offset + SIZEOF_BOUND_IMPORT_DESCRIPTOR as u64 <= end {
        let descriptor =
            BoundImportDescriptor::deserialize(buffer, offset, false).map_err(|_| BoundImportErrc::UnableToReadDescriptor)?;
        if descriptor.value.time_date_stamp == 0 && descriptor.value.offset_module_name == 0 {
            break;
        }
        let module_name = read_name(buffer, pos, descriptor.value.offset_module_name)?;
        offset += SIZEOF_BOUND_IMPORT_DESCRIPTOR as u64;

        let mut forwarders = Vec::with_capacity(descriptor.value.number_of_module_forwarder_refs as usize);
        for _ in 0..descriptor.value.number_of_module_forwarder_refs {
            let fwd = BoundImportDescriptor::deserialize(buffer, offset, false).map_err(|_| BoundImportErrc::UnableToReadDescriptor)?;
            let fwd_name = read_name(buffer, pos, fwd.value.offset_module_name)?;
            forwarders.push(BoundImportForwarder {
                time_date_stamp: fwd.value.time_date_stamp,
                offset_module_name: fwd.value.offset_module_name,
                module_name: fwd_name,
            });
            offset += SIZEOF_BOUND_IMPORT_DESCRIPTOR as u64;
        }

        entries.push(BoundImportEntry {
            descriptor,
            module_name,
            forwarders,
        });
    }
    Ok(entries)
}

fn read_name(buffer: &InputBuffer, directory_base: u64, offset_module_name: u16) -> Result<String, BoundImportErrc> {
    let name_pos = directory_base + offset_module_name as u64;
    if name_pos >= buffer.size() {
        return Err(BoundImportErrc::InvalidNameOffset);
    }
    Ok(crate::packed::packed_string::PackedCString::deserialize(buffer, name_pos, Some(256)).to_string_lossy())
}
