//! The .NET (COR20) directory: a fixed header plus three sub-ref-buffers,
//! one of which (the metadata blob) carries its own nested stream table.

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::buffers::input::{reduce, InputBufferRef};
use crate::core::data_directories::SIZEOF_DATA_DIRECTORY;
use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, FixedLayout, PackedStruct};
use crate::packed::ref_buffer::RefBuffer;

pub const SIZEOF_COR20_HEADER: usize = 72;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawCor20Header {
    pub cb: u32,
    pub major_runtime_version: u16,
    pub minor_runtime_version: u16,
    pub metadata: RawDirectoryEntry,
    pub flags: u32,
    pub entry_point_token_or_rva: u32,
    pub resources: RawDirectoryEntry,
    pub strong_name_signature: RawDirectoryEntry,
    pub code_manager_table: RawDirectoryEntry,
    pub vtable_fixups: RawDirectoryEntry,
    pub export_address_table_jumps: RawDirectoryEntry,
    pub managed_native_header: RawDirectoryEntry,
}

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawDirectoryEntry {
    pub virtual_address: u32,
    pub size: u32,
}

impl_fixed_layout_via_scroll!(RawCor20Header, SIZEOF_COR20_HEADER);

pub type Cor20Header = PackedStruct<RawCor20Header>;

pub const COMIMAGE_FLAGS_ILONLY: u32 = 0x0000_0001;
pub const COMIMAGE_FLAGS_NATIVE_ENTRYPOINT: u32 = 0x0000_0010;
pub const COMIMAGE_FLAGS_STRONGNAMESIGNED: u32 = 0x0000_0008;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DotnetDirectoryErrc {
    #[error("unable to read the COR20 header")]
    UnableToReadHeader,
    #[error("metadata root signature is not 'BSJB'")]
    InvalidMetadataSignature,
    #[error("metadata stream header table is malformed")]
    InvalidStreamHeaders,
}

const _: () = assert!(std::mem::size_of::<RawDirectoryEntry>() == SIZEOF_DATA_DIRECTORY);

/// A parsed metadata stream header: name plus the `(offset, size)` range it
/// occupies inside the metadata blob.
#[derive(Debug, Clone)]
pub struct MetadataStream {
    pub name: String,
    pub data: RefBuffer,
}

#[derive(Debug, Clone)]
pub struct MetadataRoot {
    pub major_version: u16,
    pub minor_version: u16,
    pub version_string: String,
    pub streams: Vec<MetadataStream>,
}

#[derive(Debug, Clone)]
pub struct DotnetDirectory {
    pub header: Cor20Header,
    pub metadata: RefBuffer,
    pub resources: RefBuffer,
    pub strong_name_signature: RefBuffer,
}

const BSJB_SIGNATURE: u32 = 0x4253_4a42;

pub fn parse_dotnet_directory(
    rva_source: impl Fn(u32, u32) -> Option<InputBufferRef>,
    file_source: &InputBufferRef,
    pos: u64,
    allow_virtual: bool,
) -> Result<DotnetDirectory, DotnetDirectoryErrc> {
    let header = Cor20Header::deserialize(file_source, pos, allow_virtual).map_err(|_| DotnetDirectoryErrc::UnableToReadHeader)?;

    let carve = |entry: RawDirectoryEntry| -> RefBuffer {
        if entry.virtual_address == 0 || entry.size == 0 {
            return RefBuffer::owning(Vec::new());
        }
        rva_source(entry.virtual_address, entry.size)
            .map(RefBuffer::referencing)
            .unwrap_or_else(|| RefBuffer::owning(Vec::new()))
    };

    Ok(DotnetDirectory {
        metadata: carve(header.value.metadata),
        resources: carve(header.value.resources),
        strong_name_signature: carve(header.value.strong_name_signature),
        header,
    })
}

/// Parses the `BSJB` metadata root: signature, version string, and stream
/// header table, carving each named stream's range out of `metadata`.
pub fn parse_metadata_root(metadata: &InputBufferRef) -> Result<MetadataRoot, DotnetDirectoryErrc> {
    let mut sig = [0u8; 4];
    metadata.read(0, &mut sig);
    if u32::from_le_bytes(sig) != BSJB_SIGNATURE {
        return Err(DotnetDirectoryErrc::InvalidMetadataSignature);
    }

    let mut header = [0u8; 8];
    metadata.read(4, &mut header);
    let major_version = u16::from_le_bytes(header[0..2].try_into().unwrap());
    let minor_version = u16::from_le_bytes(header[2..4].try_into().unwrap());
    let version_length = u32::from_le_bytes(header[4..8].try_into().unwrap());

    let mut version_bytes = vec![0u8; version_length as usize];
    metadata.read(16, &mut version_bytes);
    let version_end = version_bytes.iter().position(|&b| b == 0).unwrap_or(version_bytes.len());
    let version_string = String::from_utf8_lossy(&version_bytes[..version_end]).into_owned();

    let aligned_version_length = (version_length as u64 + 3) & !3;
    let flags_and_count_pos = 16 + aligned_version_length;
    let mut flags_and_count = [0u8; 4];
    metadata.read(flags_and_count_pos, &mut flags_and_count);
    let stream_count = u16::from_le_bytes(flags_and_count[2..4].try_into().unwrap());

    let mut pos = flags_and_count_pos + 4;
    let mut streams = Vec::with_capacity(stream_count as usize);
    for _ in 0..stream_count {
        let mut head = [0u8; 8];
        metadata.read(pos, &mut head);
        let offset = u32::from_le_bytes(head[0..4].try_into().unwrap());
        let size = u32::from_le_bytes(head[4..8].try_into().unwrap());
        pos += 8;

        let name_start = pos;
        let mut name_bytes = Vec::new();
        loop {
            let mut b = [0u8; 1];
            if metadata.read(pos, &mut b) == 0 || b[0] == 0 {
                pos += 1;
                break;
            }
            name_bytes.push(b[0]);
            pos += 1;
        }
        let consumed = pos - name_start;
        pos += ((4 - (consumed % 4)) % 4) as u64;
        let name = String::from_utf8_lossy(&name_bytes).into_owned();

        let data = reduce(metadata, offset as u64, size as u64)
            .map(RefBuffer::referencing)
            .unwrap_or_else(|_| RefBuffer::owning(Vec::new()));
        streams.push(MetadataStream { name, data });
    }

    Ok(MetadataRoot {
        major_version,
        minor_version,
        version_string,
        streams,
    })
}

impl MetadataRoot {
    pub fn stream(&self, name: &str) -> Option<&MetadataStream> {
        self.streams.iter().find(|s| s.name == name)
    }
}
