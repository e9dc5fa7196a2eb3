//! The optional header: a tagged union of PE32 and PE32+ layouts exposing a
//! uniform, architecture-neutral accessor surface.

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, FixedLayout, PackedStruct};

pub const MAGIC_PE32: u16 = 0x010B;
pub const MAGIC_PE32_PLUS: u16 = 0x020B;

pub const SIZEOF_STANDARD_FIELDS_32: usize = 28;
pub const SIZEOF_STANDARD_FIELDS_64: usize = 24;
pub const SIZEOF_WINDOWS_FIELDS_32: usize = 68;
pub const SIZEOF_WINDOWS_FIELDS_64: usize = 88;
pub const SIZEOF_OPTIONAL_HEADER_32: usize = SIZEOF_STANDARD_FIELDS_32 + SIZEOF_WINDOWS_FIELDS_32;
pub const SIZEOF_OPTIONAL_HEADER_64: usize = SIZEOF_STANDARD_FIELDS_64 + SIZEOF_WINDOWS_FIELDS_64;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawOptionalHeader32 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

impl_fixed_layout_via_scroll!(RawOptionalHeader32, SIZEOF_OPTIONAL_HEADER_32);

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawOptionalHeader64 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

impl_fixed_layout_via_scroll!(RawOptionalHeader64, SIZEOF_OPTIONAL_HEADER_64);

/// The optional header's PE32/PE32+ split, pattern-matched rather than
/// dispatched through a trait object.
#[derive(Debug, Clone, Copy)]
pub enum OptionalHeaderVariant {
    Pe32(PackedStruct<RawOptionalHeader32>),
    Pe32Plus(PackedStruct<RawOptionalHeader64>),
}

#[derive(Debug, Clone)]
pub struct OptionalHeader {
    pub variant: OptionalHeaderVariant,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OptionalHeaderErrc {
    #[error("unable to read the optional header magic")]
    UnableToReadMagic,
    #[error("unknown optional header magic")]
    UnknownMagic,
    #[error("unable to read the optional header")]
    UnableToReadHeader,
    #[error("size_of_optional_header is smaller than the decoded structure and data directories")]
    InvalidSizeOfOptionalHeader,
    #[error("address_of_entry_point is invalid")]
    InvalidAddressOfEntryPoint,
    #[error("image_base is invalid")]
    InvalidImageBase,
    #[error("file_alignment is invalid")]
    InvalidFileAlignment,
    #[error("section_alignment is invalid")]
    InvalidSectionAlignment,
    #[error("subsystem version is below the minimum supported (3.10)")]
    InvalidSubsystemVersion,
    #[error("size_of_heap_commit exceeds size_of_heap_reserve")]
    InvalidSizeOfHeap,
    #[error("size_of_stack_commit exceeds size_of_stack_reserve")]
    InvalidSizeOfStack,
    #[error("size_of_headers is invalid")]
    InvalidSizeOfHeaders,
    #[error("base_of_data does not exist on PE32+")]
    NoBaseOfDataField,
}

impl OptionalHeader {
    pub fn is_64bit(&self) -> bool {
        matches!(self.variant, OptionalHeaderVariant::Pe32Plus(_))
    }

    pub fn magic(&self) -> u16 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.magic,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.magic,
        }
    }

    pub fn raw_size(&self) -> usize {
        match &self.variant {
            OptionalHeaderVariant::Pe32(_) => SIZEOF_OPTIONAL_HEADER_32,
            OptionalHeaderVariant::Pe32Plus(_) => SIZEOF_OPTIONAL_HEADER_64,
        }
    }

    pub fn address_of_entry_point(&self) -> u32 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.address_of_entry_point,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.address_of_entry_point,
        }
    }

    /// Fails with [`OptionalHeaderErrc::NoBaseOfDataField`] on PE32+, which
    /// dropped this field to make room for the widened `image_base`.
    pub fn base_of_data(&self) -> Result<u32, OptionalHeaderErrc> {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => Ok(h.value.base_of_data),
            OptionalHeaderVariant::Pe32Plus(_) => Err(OptionalHeaderErrc::NoBaseOfDataField),
        }
    }

    pub fn image_base(&self) -> u64 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.image_base as u64,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.image_base,
        }
    }

    pub fn set_image_base(&mut self, value: u64) {
        match &mut self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.image_base = value as u32,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.image_base = value,
        }
    }

    pub fn section_alignment(&self) -> u32 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.section_alignment,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.section_alignment,
        }
    }

    pub fn file_alignment(&self) -> u32 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.file_alignment,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.file_alignment,
        }
    }

    pub fn subsystem_version(&self) -> (u16, u16) {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => (h.value.major_subsystem_version, h.value.minor_subsystem_version),
            OptionalHeaderVariant::Pe32Plus(h) => (h.value.major_subsystem_version, h.value.minor_subsystem_version),
        }
    }

    pub fn size_of_image(&self) -> u32 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.size_of_image,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.size_of_image,
        }
    }

    pub fn set_size_of_image(&mut self, value: u32) {
        match &mut self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.size_of_image = value,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.size_of_image = value,
        }
    }

    pub fn size_of_headers(&self) -> u32 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.size_of_headers,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.size_of_headers,
        }
    }

    pub fn number_of_rva_and_sizes(&self) -> u32 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.number_of_rva_and_sizes,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.number_of_rva_and_sizes,
        }
    }

    pub fn checksum(&self) -> u32 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.check_sum,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.check_sum,
        }
    }

    pub fn set_checksum(&mut self, value: u32) {
        match &mut self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.check_sum = value,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.check_sum = value,
        }
    }

    pub fn size_of_heap_reserve(&self) -> u64 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.size_of_heap_reserve as u64,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.size_of_heap_reserve,
        }
    }

    pub fn size_of_heap_commit(&self) -> u64 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.size_of_heap_commit as u64,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.size_of_heap_commit,
        }
    }

    pub fn size_of_stack_reserve(&self) -> u64 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.size_of_stack_reserve as u64,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.size_of_stack_reserve,
        }
    }

    pub fn size_of_stack_commit(&self) -> u64 {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.value.size_of_stack_commit as u64,
            OptionalHeaderVariant::Pe32Plus(h) => h.value.size_of_stack_commit,
        }
    }

    pub fn serialize(&self, write_virtual_part: bool) -> Vec<u8> {
        match &self.variant {
            OptionalHeaderVariant::Pe32(h) => h.serialize(write_virtual_part),
            OptionalHeaderVariant::Pe32Plus(h) => h.serialize(write_virtual_part),
        }
    }
}

/// Peeks the 16-bit magic at `pos` without consuming it, then deserializes
/// the chosen layout.
pub fn deserialize(
    buffer: &crate::buffers::InputBuffer,
    pos: u64,
    allow_virtual: bool,
) -> Result<OptionalHeader, crate::error::UtilError> {
    let mut magic_bytes = [0u8; 2];
    buffer.read(pos, &mut magic_bytes);
    let magic = u16::from_le_bytes(magic_bytes);
    let variant = if magic == MAGIC_PE32_PLUS {
        OptionalHeaderVariant::Pe32Plus(PackedStruct::<RawOptionalHeader64>::deserialize(buffer, pos, allow_virtual)?)
    } else {
        // Unknown magics are treated as PE32 by the loader and flagged via
        // `OptionalHeaderErrc::UnknownMagic` at a higher level; `deserialize`
        // itself only distinguishes the one bit that changes the layout.
        OptionalHeaderVariant::Pe32(PackedStruct::<RawOptionalHeader32>::deserialize(buffer, pos, allow_virtual)?)
    };
    Ok(OptionalHeader { variant })
}

pub mod subsystem {
    pub const UNKNOWN: u16 = 0;
    pub const NATIVE: u16 = 1;
    pub const WINDOWS_GUI: u16 = 2;
    pub const WINDOWS_CUI: u16 = 3;
    pub const WINDOWS_CE_GUI: u16 = 9;
    pub const EFI_APPLICATION: u16 = 10;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalHeaderValidationOptions {
    pub validate_address_of_entry_point: bool,
    pub validate_alignments: bool,
    pub validate_subsystem_version: bool,
    pub validate_size_of_heap: bool,
    pub validate_size_of_stack: bool,
    pub validate_size_of_headers: bool,
}

impl OptionalHeaderValidationOptions {
    pub fn all() -> Self {
        OptionalHeaderValidationOptions {
            validate_address_of_entry_point: true,
            validate_alignments: true,
            validate_subsystem_version: true,
            validate_size_of_heap: true,
            validate_size_of_stack: true,
            validate_size_of_headers: true,
        }
    }
}

fn is_power_of_two(v: u32) -> bool {
    v != 0 && (v & (v - 1)) == 0
}

/// The optional header's semantic validations, run as warnings.
#[allow(clippy::too_many_arguments)]
pub fn validate(
    header: &OptionalHeader,
    is_dll: bool,
    low_alignment: bool,
    not_relocatable: bool,
    opts: OptionalHeaderValidationOptions,
    errors: &mut crate::error_list::ErrorList<OptionalHeaderErrc>,
) {
    if opts.validate_address_of_entry_point {
        let entry = header.address_of_entry_point();
        let valid = if is_dll {
            true
        } else {
            entry != 0 && entry as u64 >= header.size_of_headers() as u64
        };
        if !valid {
            errors.add_error(OptionalHeaderErrc::InvalidAddressOfEntryPoint);
        }
    }

    let file_alignment = header.file_alignment();
    let section_alignment = header.section_alignment();

    if opts.validate_alignments {
        if !is_power_of_two(file_alignment) {
            errors.add_error(OptionalHeaderErrc::InvalidFileAlignment);
        } else if !low_alignment && !(0x200..=section_alignment.max(0x200)).contains(&file_alignment) {
            errors.add_error(OptionalHeaderErrc::InvalidFileAlignment);
        }

        if !is_power_of_two(section_alignment) {
            errors.add_error(OptionalHeaderErrc::InvalidSectionAlignment);
        } else if !low_alignment && (section_alignment < 0x1000 || section_alignment < file_alignment) {
            errors.add_error(OptionalHeaderErrc::InvalidSectionAlignment);
        }
    }

    {
        let image_base = header.image_base();
        let size_of_image = header.size_of_image() as u64;
        let base_aligned = image_base % 0x1_0000 == 0;
        let in_range = !not_relocatable || image_base.saturating_add(size_of_image) < 0x8000_0000;
        if !base_aligned || !in_range {
            errors.add_error(OptionalHeaderErrc::InvalidImageBase);
        }
    }

    if opts.validate_subsystem_version {
        let (major, minor) = header.subsystem_version();
        if (major, minor) < (3, 10) {
            errors.add_error(OptionalHeaderErrc::InvalidSubsystemVersion);
        }
    }

    if opts.validate_size_of_heap && header.size_of_heap_commit() > header.size_of_heap_reserve() {
        errors.add_error(OptionalHeaderErrc::InvalidSizeOfHeap);
    }

    if opts.validate_size_of_stack && header.size_of_stack_commit() > header.size_of_stack_reserve() {
        errors.add_error(OptionalHeaderErrc::InvalidSizeOfStack);
    }

    if opts.validate_size_of_headers {
        let size_of_headers = header.size_of_headers();
        let size_of_image = header.size_of_image();
        let headers_fit_alignment = low_alignment || size_of_headers as u64 <= section_alignment as u64;
        if !headers_fit_alignment || size_of_headers > size_of_image {
            errors.add_error(OptionalHeaderErrc::InvalidSizeOfHeaders);
        }
    }
}

/// Checks `size_of_optional_header` against the header's own layout plus
/// the declared data-directory count.
pub fn validate_size_of_optional_header(
    size_of_optional_header: u16,
    header: &OptionalHeader,
    num_data_directories: usize,
    errors: &mut crate::error_list::ErrorList<OptionalHeaderErrc>,
) {
    let required = header.raw_size() + num_data_directories * crate::core::data_directories::SIZEOF_DATA_DIRECTORY;
    if (size_of_optional_header as usize) < required {
        errors.add_error(OptionalHeaderErrc::InvalidSizeOfOptionalHeader);
    }
}
