//! The top-level error sum type.
//!
//! Per-component error enums (`DosHeaderErrc`, `OptionalHeaderErrc`,
//! `SectionErrc`, `DebugDirectoryErrc`, ...) live next to the component they
//! describe and fold into [`PeError`] through `#[from]`. Generic utility
//! failures (integer overflow, short reads) are represented once here and
//! reused by every layer above L1, since buffer arithmetic and ref-buffer
//! handling are shared across components rather than owned by any one of
//! them.

use thiserror::Error;

/// Errors shared by every layer: buffer arithmetic and short reads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UtilError {
    #[error("integer overflow computing {0}")]
    IntegerOverflow(&'static str),
    #[error("buffer overrun: requested [{offset}, {offset}+{len}) from a source of size {size}")]
    BufferOverrun {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("unaligned buffer: size {0} is not a multiple of {1}")]
    UnalignedBuffer(usize, usize),
}

pub type Result<T> = std::result::Result<T, PeError>;

/// The crate-wide fatal error sum type. A fatal error always carries enough
/// of the component taxonomy to tell a caller *which* read failed; semantic
/// validation failures never appear here, they go through
/// [`crate::error_list::ErrorList`].
#[derive(Debug, Error)]
pub enum PeError {
    #[error(transparent)]
    Util(#[from] UtilError),
    #[error(transparent)]
    DosHeader(#[from] crate::core::dos_header::DosHeaderErrc),
    #[error(transparent)]
    ImageSignature(#[from] crate::core::image_signature::ImageSignatureErrc),
    #[error(transparent)]
    FileHeader(#[from] crate::core::file_header::FileHeaderErrc),
    #[error(transparent)]
    OptionalHeader(#[from] crate::core::optional_header::OptionalHeaderErrc),
    #[error(transparent)]
    Section(#[from] crate::core::section::SectionErrc),
    #[error(transparent)]
    DataDirectories(#[from] crate::core::data_directories::DataDirectoriesErrc),
    #[error(transparent)]
    ImageLoader(#[from] crate::image::loader::ImageLoaderErrc),
    #[error(transparent)]
    ImageBuilder(#[from] crate::image::builder::ImageBuilderErrc),
    #[error(transparent)]
    Checksum(#[from] crate::image::checksum::ChecksumErrc),
    #[error(transparent)]
    RefBuffer(#[from] crate::packed::ref_buffer::RefBufferErrc),
    #[error(transparent)]
    Debug(#[from] crate::directories::debug::DebugDirectoryErrc),
    #[error(transparent)]
    LoadConfig(#[from] crate::directories::load_config::LoadConfigErrc),
    #[error(transparent)]
    BoundImport(#[from] crate::directories::bound_import::BoundImportErrc),
    #[error(transparent)]
    Dotnet(#[from] crate::directories::dotnet::DotnetDirectoryErrc),
    #[error(transparent)]
    VersionInfo(#[from] crate::directories::resources::version_info::VersionInfoErrc),
    #[error(transparent)]
    MessageTable(#[from] crate::directories::resources::message_table::MessageTableErrc),
    #[error(transparent)]
    Resource(#[from] crate::directories::resources::tree::ResourceErrc),
    #[error(transparent)]
    Relocations(#[from] crate::directories::relocations::RelocationErrc),
    #[error(transparent)]
    Security(#[from] crate::directories::security::SecurityErrc),
}
