//! One section header (`IMAGE_SECTION_HEADER`).

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, FixedLayout, PackedStruct};

pub const SIZEOF_SECTION_HEADER: usize = 40;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawSectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

impl_fixed_layout_via_scroll!(RawSectionHeader, SIZEOF_SECTION_HEADER);

pub type SectionHeader = PackedStruct<RawSectionHeader>;

pub mod characteristics {
    pub const CNT_CODE: u32 = 0x0000_0020;
    pub const CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
    pub const CNT_UNINITIALIZED_DATA: u32 = 0x0000_0080;
    pub const MEM_EXECUTE: u32 = 0x2000_0000;
    pub const MEM_READ: u32 = 0x4000_0000;
    pub const MEM_WRITE: u32 = 0x8000_0000;
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

impl RawSectionHeader {
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// `pointer_to_raw_data <= 0x1ff` means "no on-disk data".
    pub fn effective_pointer_to_raw_data(&self) -> u32 {
        if self.pointer_to_raw_data <= 0x1ff {
            0
        } else {
            self.pointer_to_raw_data
        }
    }

    /// `raw_size(sa) = min(size_of_raw_data, align_up(virtual_size, sa))`.
    pub fn raw_size(&self, section_alignment: u32) -> u64 {
        (self.size_of_raw_data as u64).min(align_up(self.virtual_size as u64, section_alignment as u64))
    }

    /// `virtual_size(sa) = align_up(max(virtual_size, size_of_raw_data), sa)`.
    pub fn virtual_size_aligned(&self, section_alignment: u32) -> u64 {
        align_up(
            (self.virtual_size as u64).max(self.size_of_raw_data as u64),
            section_alignment as u64,
        )
    }

    pub fn contains_rva(&self, rva: u32, size: u32, section_alignment: u32) -> bool {
        let start = self.virtual_address as u64;
        let end = start + self.virtual_size_aligned(section_alignment);
        let rva_end = rva as u64 + size as u64;
        (rva as u64) >= start && rva_end <= end
    }

    pub fn contains_file_offset(&self, offset: u64, section_alignment: u32) -> bool {
        let start = self.effective_pointer_to_raw_data() as u64;
        let end = start + self.raw_size(section_alignment);
        offset >= start && offset < end
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SectionErrc {
    #[error("unable to read a section header")]
    UnableToRead,
    #[error("invalid raw size")]
    InvalidRawSize,
    #[error("invalid virtual size")]
    InvalidVirtualSize,
    #[error("invalid raw address")]
    InvalidRawAddress,
    #[error("raw address is not aligned to the file alignment")]
    UnalignedRawAddress,
    #[error("size/address arithmetic overflows")]
    AddressArithmeticOverflow,
    #[error("virtual address is not aligned to the section alignment")]
    UnalignedVirtualAddress,
    #[error("virtual address leaves a gap from the previous section")]
    VirtualAddressGap,
    #[error("low-alignment image requires matching rva and raw pointer")]
    LowAlignmentMismatch,
}
