//! The `PE\0\0` image signature.

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, PackedStruct};

pub const SIZEOF_IMAGE_SIGNATURE: usize = 4;
pub const PE_MAGIC: u32 = 0x0000_4550; // "PE\0\0" read as a little-endian u32

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawImageSignature(pub u32);

impl_fixed_layout_via_scroll!(RawImageSignature, SIZEOF_IMAGE_SIGNATURE);

pub type ImageSignature = PackedStruct<RawImageSignature>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ImageSignatureErrc {
    #[error("unable to read the PE signature")]
    UnableToRead,
    #[error("invalid PE signature value")]
    InvalidSignature,
}

/// Validates the signature value. This is a warning by default; a
/// caller-controlled option elevates it to fatal (the loader does that by
/// checking `has_error` before continuing).
pub fn validate(sig: &ImageSignature, errors: &mut crate::error_list::ErrorList<ImageSignatureErrc>) {
    if sig.value.0 != PE_MAGIC {
        errors.add_error(ImageSignatureErrc::InvalidSignature);
    }
}
