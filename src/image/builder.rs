//! Rebuilds the byte stream for an [`Image`] in on-disk order.

use log::debug;
use thiserror::Error;

use crate::buffers::copy::buffer_copy;
use crate::buffers::output::OutputBuffer;
use crate::core::dos_header::SIZEOF_DOS_HEADER;
use crate::core::image_signature::SIZEOF_IMAGE_SIGNATURE;

use super::container::Image;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ImageBuilderErrc {
    #[error("number of section headers does not match the number of section data buffers")]
    InconsistentSectionHeadersAndData,
    #[error("e_lfanew arithmetic overflows the output buffer's position type")]
    InvalidSectionTableOffset,
}

fn write_at(dst: &mut OutputBuffer<'_>, pos: u64, bytes: &[u8]) {
    dst.set_wpos(pos);
    dst.write(bytes);
}

/// Writes `image` into `dst`, returning the greatest offset written past.
///
/// Order: DOS header, DOS stub, PE signature + file header + optional
/// header + data directories + section table at `e_lfanew`, any residual
/// header bytes the full-headers buffer carries past the section table,
/// each section's raw bytes at its `pointer_to_raw_data`, then the overlay.
pub fn build(image: &Image, dst: &mut OutputBuffer<'_>, write_virtual_parts: bool) -> Result<u64, ImageBuilderErrc> {
    if image.section_table.len() != image.section_data_list.len() {
        return Err(ImageBuilderErrc::InconsistentSectionHeadersAndData);
    }

    let e_lfanew = image.dos_header.value.e_lfanew as u64;
    e_lfanew
        .checked_add(SIZEOF_IMAGE_SIGNATURE as u64)
        .ok_or(ImageBuilderErrc::InvalidSectionTableOffset)?;

    write_at(dst, 0, &image.dos_header.serialize(write_virtual_parts));
    write_at(dst, SIZEOF_DOS_HEADER as u64, &image.dos_stub.data.data().to_vec());

    let mut pos = e_lfanew;
    write_at(dst, pos, &image.image_signature.serialize(write_virtual_parts));
    pos += SIZEOF_IMAGE_SIGNATURE as u64;

    write_at(dst, pos, &image.file_header.serialize(write_virtual_parts));
    pos += crate::core::file_header::SIZEOF_FILE_HEADER as u64;

    let optional_header_start = pos;
    if let Some(header) = &image.optional_header {
        write_at(dst, pos, &header.serialize(write_virtual_parts));
        let after_header = pos + header.raw_size() as u64;
        write_at(dst, after_header, &image.data_directories.serialize(write_virtual_parts));
    }
    let size_of_optional_header = image.file_header.value.size_of_optional_header as u64;
    let section_table_pos = optional_header_start + size_of_optional_header;

    write_at(dst, section_table_pos, &image.section_table.serialize(write_virtual_parts));
    let section_table_end =
        section_table_pos + image.section_table.len() as u64 * crate::core::section::header::SIZEOF_SECTION_HEADER as u64;

    if let Some(full_headers) = &image.full_headers_buffer {
        let full_headers_size = full_headers.size();
        if full_headers_size > section_table_end {
            dst.set_wpos(section_table_end);
            buffer_copy(&full_headers.data(), section_table_end, full_headers_size - section_table_end, dst);
        }
    }

    let section_alignment = image.optional_header.as_ref().map(|h| h.section_alignment()).unwrap_or(0x1000);
    let mut last_section_end = section_table_end;
    for (header, data) in image.section_table.headers().iter().zip(&image.section_data_list) {
        let raw_pos = header.value.effective_pointer_to_raw_data() as u64;
        let raw_size = header.value.raw_size(section_alignment);
        dst.set_wpos(raw_pos);
        buffer_copy(&data.data(), 0, raw_size, dst);
        last_section_end = last_section_end.max(raw_pos + raw_size);
    }

    if let Some(overlay) = &image.overlay {
        dst.set_wpos(last_section_end);
        let written = buffer_copy(&overlay.data(), 0, overlay.size(), dst);
        last_section_end += written;
    }

    debug!("built image, {last_section_end} bytes");
    Ok(last_section_end)
}
