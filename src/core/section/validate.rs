//! Per-section and whole-table validation, kept separate from the data
//! types themselves so a caller can validate without owning a mutable
//! error list for every read.

use super::header::{RawSectionHeader, SectionErrc};
use crate::error_list::ErrorList;

/// Section-alignment==file-alignment and both in `[1, 0x800]` — disables
/// the usual 0x1000/0x200 minimums and forces every section's rva to equal
/// its raw pointer.
pub fn is_low_alignment_image(section_alignment: u32, file_alignment: u32) -> bool {
    section_alignment == file_alignment && (1..=0x800).contains(&section_alignment)
}

/// Validates one section header, appending at most one error per rule,
/// indexed by `section_index` in the caller's `ErrorList`.
pub fn validate_section_header(
    header: &RawSectionHeader,
    section_index: usize,
    section_alignment: u32,
    file_alignment: u32,
    low_alignment: bool,
    previous_virtual_end: Option<u64>,
    errors: &mut ErrorList<SectionErrc>,
) {
    let ptr = header.effective_pointer_to_raw_data() as u64;
    let raw_size = header.size_of_raw_data as u64;
    let virt_size = header.virtual_size as u64;

    if ptr.checked_add(raw_size).is_none() {
        errors.add_error_at(SectionErrc::AddressArithmeticOverflow, section_index);
    }
    if (header.virtual_address as u64).checked_add(virt_size.max(raw_size)).is_none() {
        errors.add_error_at(SectionErrc::AddressArithmeticOverflow, section_index);
    }

    if raw_size > u32::MAX as u64 {
        errors.add_error_at(SectionErrc::InvalidRawSize, section_index);
    }
    if virt_size == 0 && raw_size == 0 {
        errors.add_error_at(SectionErrc::InvalidVirtualSize, section_index);
    }

    if ptr != 0 && file_alignment != 0 && ptr % file_alignment as u64 != 0 {
        errors.add_error_at(SectionErrc::UnalignedRawAddress, section_index);
    }

    if section_alignment != 0 && header.virtual_address as u64 % section_alignment as u64 != 0 {
        errors.add_error_at(SectionErrc::UnalignedVirtualAddress, section_index);
    }

    if let Some(prev_end) = previous_virtual_end {
        if (header.virtual_address as u64) > prev_end {
            errors.add_error_at(SectionErrc::VirtualAddressGap, section_index);
        }
    }

    if low_alignment && header.virtual_address as u64 != ptr {
        errors.add_error_at(SectionErrc::LowAlignmentMismatch, section_index);
    }
}

/// Runs [`validate_section_header`] over every section in order, tracking
/// the running virtual end for the gap check.
pub fn validate_section_table(
    headers: &[RawSectionHeader],
    section_alignment: u32,
    file_alignment: u32,
    errors: &mut ErrorList<SectionErrc>,
) {
    let low_alignment = is_low_alignment_image(section_alignment, file_alignment);
    let mut previous_virtual_end = None;
    for (i, header) in headers.iter().enumerate() {
        validate_section_header(
            header,
            i,
            section_alignment,
            file_alignment,
            low_alignment,
            previous_virtual_end,
            errors,
        );
        previous_virtual_end = Some(header.virtual_address as u64 + header.virtual_size_aligned(section_alignment));
    }
}
