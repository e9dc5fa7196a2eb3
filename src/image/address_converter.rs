//! Translation between the coordinate systems a loaded image exposes: RVA,
//! VA, file offset, and section-relative offset.

use thiserror::Error;

use crate::buffers::input::{extend_virtual, reduce, InputBufferRef};
use crate::core::data_directories::{DataDirectories, DataDirectory, DirectoryEntry};
use crate::core::section::header::SectionHeader;

use super::container::Image;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AddressConverterErrc {
    #[error("rva_to_va overflows the requested address width")]
    AddressOverflow,
    #[error("va is below image_base")]
    ConversionOverflow,
    #[error("no section contains the requested range")]
    SectionNotFound,
}

/// Holds the one piece of state address translation needs: `image_base`.
#[derive(Debug, Clone, Copy)]
pub struct AddressConverter {
    image_base: u64,
}

impl AddressConverter {
    pub fn new(image_base: u64) -> Self {
        AddressConverter { image_base }
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    /// `width` is 32 or 64; anything else is treated as 64.
    pub fn rva_to_va(&self, rva: u32, width: u32) -> Result<u64, AddressConverterErrc> {
        let va = self
            .image_base
            .checked_add(rva as u64)
            .ok_or(AddressConverterErrc::AddressOverflow)?;
        if width == 32 && va > u32::MAX as u64 {
            return Err(AddressConverterErrc::AddressOverflow);
        }
        Ok(va)
    }

    pub fn va_to_rva(&self, va: u64) -> Result<u32, AddressConverterErrc> {
        let rva = va.checked_sub(self.image_base).ok_or(AddressConverterErrc::ConversionOverflow)?;
        if rva > u32::MAX as u64 {
            return Err(AddressConverterErrc::ConversionOverflow);
        }
        Ok(rva as u32)
    }
}

fn section_alignment(image: &Image) -> u32 {
    image.optional_header.as_ref().map(|h| h.section_alignment()).unwrap_or(0x1000)
}

/// Finds the section header whose virtual extent contains
/// `[rva, rva + data_size)`.
pub fn section_from_rva(image: &Image, rva: u32, data_size: u32) -> Option<&SectionHeader> {
    let sa = section_alignment(image);
    image
        .section_table
        .headers()
        .iter()
        .find(|h| h.value.contains_rva(rva, data_size, sa))
}

pub fn section_from_va(image: &Image, converter: &AddressConverter, va: u64, data_size: u32) -> Option<&SectionHeader> {
    let rva = converter.va_to_rva(va).ok()?;
    section_from_rva(image, rva, data_size)
}

pub fn section_from_file_offset(image: &Image, offset: u64) -> Option<&SectionHeader> {
    let sa = section_alignment(image);
    image
        .section_table
        .headers()
        .iter()
        .find(|h| h.value.contains_file_offset(offset, sa))
}

pub fn section_from_directory(image: &Image, entry: DirectoryEntry) -> Option<&SectionHeader> {
    let directory = data_directory(&image.data_directories, entry)?;
    section_from_rva(image, directory.value.virtual_address, directory.value.size)
}

fn data_directory(directories: &DataDirectories, entry: DirectoryEntry) -> Option<&DataDirectory> {
    directories.get(entry)
}

/// Builds an input buffer covering `[rva, rva + size)`, from the owning
/// section's body when one contains the range, or from the full-headers
/// buffer when `include_headers` and the range falls inside the header
/// region. `allow_virtual` controls whether a range extending past a
/// section's physical extent is zero-filled rather than rejected.
pub fn section_data_from_rva(
    image: &Image,
    rva: u32,
    size: u32,
    include_headers: bool,
    allow_virtual: bool,
) -> Result<InputBufferRef, AddressConverterErrc> {
    let sa = section_alignment(image);
    if let Some((index, header)) = image
        .section_table
        .headers()
        .iter()
        .enumerate()
        .find(|(_, h)| h.value.contains_rva(rva, size, sa))
    {
        let section_data = image
            .section_data_list
            .get(index)
            .ok_or(AddressConverterErrc::SectionNotFound)?;
        let start = rva as u64 - header.value.virtual_address as u64;
        let physical = section_data.data().physical_size();
        let buffer = section_data.data();
        return if start + size as u64 <= physical {
            reduce(&buffer, start, size as u64).map_err(|_| AddressConverterErrc::SectionNotFound)
        } else if allow_virtual {
            let physical_part = physical.saturating_sub(start);
            let physical_slice = reduce(&buffer, start, physical_part.min(size as u64)).map_err(|_| AddressConverterErrc::SectionNotFound)?;
            Ok(extend_virtual(physical_slice, size as u64 - physical_part.min(size as u64)))
        } else {
            Err(AddressConverterErrc::SectionNotFound)
        };
    }

    if include_headers {
        let size_of_headers = image.optional_header.as_ref().map(|h| h.size_of_headers() as u64).unwrap_or(0);
        if (rva as u64) + (size as u64) <= size_of_headers {
            if let Some(headers) = &image.full_headers_buffer {
                return reduce(&headers.data(), rva as u64, size as u64).map_err(|_| AddressConverterErrc::SectionNotFound);
            }
        }
    }

    Err(AddressConverterErrc::SectionNotFound)
}

/// Converts a file offset to an rva using whichever section's raw extent
/// contains it; offsets inside the header region map 1:1.
pub fn file_offset_to_rva(image: &Image, offset: u64) -> Option<u32> {
    let sa = section_alignment(image);
    if let Some(header) = section_from_file_offset(image, offset) {
        let delta = offset - header.value.effective_pointer_to_raw_data() as u64;
        return Some(header.value.virtual_address + delta as u32);
    }
    let size_of_headers = image.optional_header.as_ref().map(|h| h.size_of_headers() as u64).unwrap_or(0);
    if offset < size_of_headers {
        let _ = sa;
        return Some(offset as u32);
    }
    None
}

pub fn rva_to_file_offset(image: &Image, rva: u32) -> Option<u64> {
    let sa = section_alignment(image);
    if let Some(header) = section_from_rva(image, rva, 0) {
        let delta = rva - header.value.virtual_address;
        return Some(header.value.effective_pointer_to_raw_data() as u64 + delta as u64);
    }
    let size_of_headers = image.optional_header.as_ref().map(|h| h.size_of_headers() as u32).unwrap_or(0);
    if rva < size_of_headers {
        let _ = sa;
        return Some(rva as u64);
    }
    None
}
