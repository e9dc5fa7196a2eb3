//! L3: the image skeleton — DOS header, DOS stub, PE signature, file
//! header, optional header, data directories, section table/data, overlay.
//! Fixed-layout records use `scroll`'s derive macros for encoding.

pub mod data_directories;
pub mod dos_header;
pub mod dos_stub;
pub mod file_header;
pub mod image_signature;
pub mod optional_header;
pub mod overlay;
pub mod section;
