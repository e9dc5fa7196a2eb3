//! The DOS header (`IMAGE_DOS_HEADER`).

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, PackedStruct};

pub const SIZEOF_DOS_HEADER: usize = 64;
pub const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
pub const MAX_E_LFANEW: u32 = 10 * 1024 * 1024;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawDosHeader {
    pub e_magic: u16,
    pub e_cblp: u16,
    pub e_cp: u16,
    pub e_crlc: u16,
    pub e_cparhdr: u16,
    pub e_minalloc: u16,
    pub e_maxalloc: u16,
    pub e_ss: u16,
    pub e_sp: u16,
    pub e_csum: u16,
    pub e_ip: u16,
    pub e_cs: u16,
    pub e_lfarlc: u16,
    pub e_ovno: u16,
    pub e_res: [u16; 4],
    pub e_oemid: u16,
    pub e_oeminfo: u16,
    pub e_res2: [u16; 10],
    pub e_lfanew: u32,
}

impl_fixed_layout_via_scroll!(RawDosHeader, SIZEOF_DOS_HEADER);

pub type DosHeader = PackedStruct<RawDosHeader>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DosHeaderErrc {
    #[error("invalid DOS header signature")]
    InvalidSignature,
    #[error("e_lfanew is unaligned or out of the allowed range")]
    InvalidELfanew,
    #[error("unable to read the DOS header")]
    UnableToReadHeader,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DosHeaderValidationOptions {
    pub validate_e_lfanew: bool,
    pub validate_magic: bool,
}

impl Default for DosHeaderValidationOptions {
    fn default() -> Self {
        DosHeaderValidationOptions {
            validate_e_lfanew: true,
            validate_magic: true,
        }
    }
}

/// Validates (as warnings, appended to `errors`) the two fields Windows
/// actually relies on.
pub fn validate(
    header: &DosHeader,
    opts: DosHeaderValidationOptions,
    errors: &mut crate::error_list::ErrorList<DosHeaderErrc>,
) {
    if opts.validate_magic && header.value.e_magic != DOS_MAGIC {
        errors.add_error(DosHeaderErrc::InvalidSignature);
    }
    if opts.validate_e_lfanew {
        let lfanew = header.value.e_lfanew;
        if lfanew < 4 || lfanew % 4 != 0 || lfanew > MAX_E_LFANEW {
            errors.add_error(DosHeaderErrc::InvalidELfanew);
        }
    }
}
