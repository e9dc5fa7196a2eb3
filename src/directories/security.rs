//! The security (certificate table) directory and the Authenticode digest
//! computation layered on top of it. The directory's `virtual_address` is
//! unusually a *file offset*, not an RVA — certificates live past the
//! mapped image and are never paged in.

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::buffers::input::{reduce, InputBuffer, InputBufferRef};
use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, FixedLayout, PackedStruct};
use crate::packed::ref_buffer::RefBuffer;

pub const SIZEOF_WIN_CERTIFICATE_HEADER: usize = 8;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawWinCertificateHeader {
    pub length: u32,
    pub revision: u16,
    pub certificate_type: u16,
}

impl_fixed_layout_via_scroll!(RawWinCertificateHeader, SIZEOF_WIN_CERTIFICATE_HEADER);

pub type WinCertificateHeader = PackedStruct<RawWinCertificateHeader>;

pub mod certificate_type {
    pub const X509: u16 = 1;
    pub const PKCS_SIGNED_DATA: u16 = 2;
    pub const RESERVED_1: u16 = 3;
    pub const TS_STACK_SIGNED: u16 = 4;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SecurityErrc {
    #[error("unable to read a WIN_CERTIFICATE header")]
    UnableToReadHeader,
    #[error("certificate length is smaller than its own header")]
    InvalidCertificateLength,
}

#[derive(Debug, Clone)]
pub struct Certificate {
    pub header: WinCertificateHeader,
    pub data: RefBuffer,
}

/// Walks the certificate table: each entry is padded to an 8-byte boundary,
/// per the `length` field in its own header (which includes the header
/// itself).
pub fn parse_certificate_table(buffer: &InputBufferRef, pos: u64, size: u32) -> Result<Vec<Certificate>, SecurityErrc> {
    let end = pos + size as u64;
    let mut offset = pos;
    let mut certs = Vec::new();

    while offset + SIZEOF_WIN_CERTIFICATE_HEADER as u64 <= end {
        let header = WinCertificateHeader::deserialize(buffer, offset, false).map_err(|_| SecurityErrc::UnableToReadHeader)?;
        if (header.value.length as usize) < SIZEOF_WIN_CERTIFICATE_HEADER {
            return Err(SecurityErrc::InvalidCertificateLength);
        }
        let data_size = header.value.length as u64 - SIZEOF_WIN_CERTIFICATE_HEADER as u64;
        let data = reduce(buffer, offset + SIZEOF_WIN_CERTIFICATE_HEADER as u64, data_size)
            .map(RefBuffer::referencing)
            .unwrap_or_else(|_| RefBuffer::owning(Vec::new()));

        certs.push(Certificate { header, data });
        let aligned_len = (header.value.length as u64 + 7) & !7;
        offset += aligned_len.max(SIZEOF_WIN_CERTIFICATE_HEADER as u64);
    }
    Ok(certs)
}

/// Computes an Authenticode-style digest over the image, excluding the
/// checksum field and the security directory entry/table itself, using a
/// caller-supplied hasher (kept generic so this crate never forces a
/// specific digest algorithm on callers who don't need the `authenticode`
/// feature's default).
#[cfg(feature = "authenticode")]
pub fn authenticode_digest<H: AuthenticodeHasher>(
    image: &crate::image::Image,
    source: &InputBuffer,
    mut hasher: H,
) -> Result<H::Output, SecurityErrc> {
    let checksum_offset = crate::image::checksum::checksum_field_offset(image).unwrap_or(u64::MAX);
    let security_directory = image
        .data_directories
        .get(crate::core::data_directories::DirectoryEntry::Security)
        .map(|d| (d.value.virtual_address as u64, d.value.size as u64));

    let headers_size = image
        .full_headers_buffer
        .as_ref()
        .map(|b| b.size())
        .unwrap_or(crate::core::dos_header::SIZEOF_DOS_HEADER as u64);

    let security_dir_field_start = image.optional_header.as_ref().map(|header| {
        let e_lfanew = image.dos_header.value.e_lfanew as u64;
        let optional_header_start =
            e_lfanew + crate::core::image_signature::SIZEOF_IMAGE_SIGNATURE as u64 + crate::core::file_header::SIZEOF_FILE_HEADER as u64;
        optional_header_start
            + header.raw_size() as u64
            + crate::core::data_directories::DirectoryEntry::Security as u64 * crate::core::data_directories::SIZEOF_DATA_DIRECTORY as u64
    });
    let security_dir_field_end = security_dir_field_start.map(|start| start + crate::core::data_directories::SIZEOF_DATA_DIRECTORY as u64);

    hash_range_excluding(source, &mut hasher, 0, checksum_offset, checksum_offset + 4);
    match (security_dir_field_start, security_dir_field_end) {
        (Some(field_start), Some(field_end)) if field_start >= checksum_offset + 4 && field_end <= headers_size => {
            hash_range(source, &mut hasher, checksum_offset + 4, field_start);
            hash_range(source, &mut hasher, field_end, headers_size);
        }
        _ => hash_range(source, &mut hasher, checksum_offset + 4, headers_size),
    }

    let section_alignment = image.optional_header.as_ref().map(|h| h.section_alignment()).unwrap_or(0x1000);
    for header in image.section_table.headers() {
        let start = header.value.effective_pointer_to_raw_data() as u64;
        let size = header.value.raw_size(section_alignment);
        hash_range(source, &mut hasher, start, start + size);
    }

    if let Some((sec_offset, sec_size)) = security_directory {
        let end = source.size();
        if sec_offset + sec_size < end {
            hash_range(source, &mut hasher, sec_offset + sec_size, end);
        }
    } else if let Some(overlay) = &image.overlay {
        let bytes = overlay.data().to_vec();
        hasher.update(&bytes);
    }

    Ok(hasher.finish())
}

#[cfg(feature = "authenticode")]
fn hash_range<H: AuthenticodeHasher>(source: &InputBuffer, hasher: &mut H, start: u64, end: u64) {
    if end <= start {
        return;
    }
    let mut buf = vec![0u8; (end - start) as usize];
    source.read(start, &mut buf);
    hasher.update(&buf);
}

#[cfg(feature = "authenticode")]
fn hash_range_excluding<H: AuthenticodeHasher>(source: &InputBuffer, hasher: &mut H, start: u64, hole_start: u64, hole_end: u64) {
    hash_range(source, hasher, start, hole_start);
    let _ = hole_end;
}

/// A minimal digest interface so this crate does not force `sha2` (or any
/// particular algorithm) on callers who only need directory parsing.
#[cfg(feature = "authenticode")]
pub trait AuthenticodeHasher {
    type Output;
    fn update(&mut self, bytes: &[u8]);
    fn finish(self) -> Self::Output;
}

#[cfg(feature = "authenticode")]
impl AuthenticodeHasher for sha2::Sha256 {
    type Output = sha2::digest::Output<sha2::Sha256>;

    fn update(&mut self, bytes: &[u8]) {
        use sha2::Digest;
        Digest::update(self, bytes);
    }

    fn finish(self) -> Self::Output {
        use sha2::Digest;
        Digest::finalize(self)
    }
}
