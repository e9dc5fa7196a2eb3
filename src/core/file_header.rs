//! The COFF file header.

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, PackedStruct};

pub const SIZEOF_FILE_HEADER: usize = 20;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawFileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl_fixed_layout_via_scroll!(RawFileHeader, SIZEOF_FILE_HEADER);

pub type FileHeader = PackedStruct<RawFileHeader>;

pub mod characteristics {
    pub const RELOCS_STRIPPED: u16 = 0x0001;
    pub const EXECUTABLE_IMAGE: u16 = 0x0002;
    pub const LARGE_ADDRESS_AWARE: u16 = 0x0020;
    pub const DLL: u16 = 0x2000;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FileHeaderErrc {
    #[error("unable to read the file header")]
    UnableToRead,
}

impl RawFileHeader {
    pub fn is_dll(&self) -> bool {
        self.characteristics & characteristics::DLL != 0
    }
}
