//! Construction of each section's data ref-buffer.

use crate::buffers::input::{extend_virtual, reduce, InputBufferRef};
use crate::packed::ref_buffer::RefBuffer;

use super::header::RawSectionHeader;

/// Builds the ref-buffer for one section's body.
///
/// In on-disk layout: starts at `pointer_to_raw_data`, spans `raw_size`,
/// then is wrapped in a virtual buffer extending to `virtual_size` so reads
/// past the physical extent read as zero.
///
/// In loaded-to-memory layout: starts at `virtual_address`, spans
/// `virtual_size` directly out of the (already-expanded) process image,
/// with no virtual wrapping — the bytes are really there.
pub fn build_section_data(
    root: &InputBufferRef,
    header: &RawSectionHeader,
    section_alignment: u32,
    loaded_to_memory: bool,
) -> Result<RefBuffer, crate::error::UtilError> {
    if loaded_to_memory {
        let start = header.virtual_address as u64;
        let size = header.virtual_size_aligned(section_alignment);
        let section = reduce(root, start, size)?;
        return Ok(RefBuffer::referencing(section));
    }

    let start = header.effective_pointer_to_raw_data() as u64;
    let raw_size = header.raw_size(section_alignment);
    let virtual_size = header.virtual_size_aligned(section_alignment);
    let physical = reduce(root, start, raw_size)?;
    let buffer = if virtual_size > raw_size {
        extend_virtual(physical, virtual_size - raw_size)
    } else {
        physical
    };
    Ok(RefBuffer::referencing(buffer))
}
