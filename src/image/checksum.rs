//! The Microsoft PE checksum: a 32-bit add-with-carry over the file's
//! DWORDs, with the checksum field itself zeroed, plus the file length.

use thiserror::Error;

use crate::buffers::input::InputBuffer;
use crate::core::dos_header::SIZEOF_DOS_HEADER;
use crate::core::file_header::SIZEOF_FILE_HEADER;
use crate::core::image_signature::SIZEOF_IMAGE_SIGNATURE;

use super::container::Image;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumErrc {
    #[error("buffer size {0} is not a multiple of 4")]
    UnalignedBuffer(u64),
}

struct Accumulator {
    sum: u64,
}

impl Accumulator {
    fn new() -> Self {
        Accumulator { sum: 0 }
    }

    fn add_dwords(&mut self, bytes: &[u8]) -> Result<(), ChecksumErrc> {
        if bytes.len() % 4 != 0 {
            return Err(ChecksumErrc::UnalignedBuffer(bytes.len() as u64));
        }
        for chunk in bytes.chunks_exact(4) {
            let word = u32::from_le_bytes(chunk.try_into().unwrap());
            self.sum += word as u64;
            self.sum = (self.sum & 0xffff_ffff) + (self.sum >> 32);
        }
        Ok(())
    }

    fn finish(mut self, file_length: u64) -> u32 {
        self.sum = (self.sum & 0xffff) + (self.sum >> 16);
        self.sum = (self.sum & 0xffff) + (self.sum >> 16);
        self.sum += file_length;
        self.sum as u32
    }
}

/// The byte offset of the `check_sum` field within the optional header,
/// relative to the start of the file.
pub fn checksum_field_offset(image: &Image) -> Option<u64> {
    let _ = image.optional_header.as_ref()?;
    let e_lfanew = image.dos_header.value.e_lfanew as u64;
    let magic_size = 2u64;
    // offsetof(standard fields) + offsetof(check_sum within windows fields)
    // is a fixed 64 bytes for both PE32 and PE32+: the 24/28-byte standard
    // block plus the windows fields up through size_of_headers (20 bytes
    // common to both layouts).
    let offset_in_optional_header = if image.is_64bit() { 72 } else { 68 };
    Some(e_lfanew + SIZEOF_IMAGE_SIGNATURE as u64 + SIZEOF_FILE_HEADER as u64 + magic_size + offset_in_optional_header - magic_size)
}

/// Computes the checksum over the already-built file image in `source`,
/// which must be the same bytes [`super::builder::build`] produces.
pub fn compute(image: &Image, source: &InputBuffer) -> Result<u32, ChecksumErrc> {
    let checksum_offset = checksum_field_offset(image).unwrap_or(u64::MAX);
    let file_length = source.size();
    let mut acc = Accumulator::new();

    let headers_size = image
        .full_headers_buffer
        .as_ref()
        .map(|b| b.size())
        .unwrap_or(SIZEOF_DOS_HEADER as u64);

    let mut headers = vec![0u8; headers_size as usize];
    source.read(0, &mut headers);
    if checksum_offset.saturating_add(4) <= headers_size {
        headers[checksum_offset as usize..checksum_offset as usize + 4].fill(0);
    }
    acc.add_dwords(&headers)?;

    let section_alignment = image.optional_header.as_ref().map(|h| h.section_alignment()).unwrap_or(0x1000);
    for header in image.section_table.headers() {
        let start = header.value.effective_pointer_to_raw_data() as u64;
        let size = header.value.raw_size(section_alignment);
        if size == 0 {
            continue;
        }
        let mut bytes = vec![0u8; size as usize];
        source.read(start, &mut bytes);
        acc.add_dwords(&bytes)?;
    }

    if let Some(overlay) = &image.overlay {
        let bytes = overlay.data().to_vec();
        if !bytes.is_empty() {
            acc.add_dwords(&bytes)?;
        }
    }

    Ok(acc.finish(file_length))
}
