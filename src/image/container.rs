//! The image aggregate root: every structure the loader populates, held
//! together as one value.

use crate::buffers::input::InputBufferRef;
use crate::core::data_directories::DataDirectories;
use crate::core::dos_header::DosHeader;
use crate::core::dos_stub::DosStub;
use crate::core::file_header::FileHeader;
use crate::core::image_signature::ImageSignature;
use crate::core::optional_header::OptionalHeader;
use crate::core::section::table::SectionTable;
use crate::packed::ref_buffer::RefBuffer;

/// The root value this crate builds from bytes and can serialize back.
///
/// All sub-structures hold references (via [`RefBuffer`]) into the buffer
/// the image was parsed from; because those references are `Arc`-backed,
/// the source stays alive for as long as any part of the image needs it —
/// there is no separate "the buffer must outlive the image" lifetime
/// contract to uphold by hand. [`Image::copy_referenced_section_memory`]
/// still exists for callers that want to drop the source buffer promptly
/// (e.g. a memory-mapped file the caller intends to unmap).
#[derive(Debug, Clone)]
pub struct Image {
    pub dos_header: DosHeader,
    pub dos_stub: DosStub,
    pub image_signature: ImageSignature,
    pub file_header: FileHeader,
    pub optional_header: Option<OptionalHeader>,
    pub data_directories: DataDirectories,
    pub section_table: SectionTable,
    pub section_data_list: Vec<RefBuffer>,
    pub overlay: Option<RefBuffer>,
    pub full_headers_buffer: Option<RefBuffer>,
    pub(crate) loaded_to_memory: bool,
}

impl Image {
    pub fn is_64bit(&self) -> bool {
        self.optional_header.as_ref().map(|h| h.is_64bit()).unwrap_or(false)
    }

    pub fn is_dll(&self) -> bool {
        use crate::core::file_header::characteristics;
        self.file_header.value.characteristics & characteristics::DLL != 0
    }

    pub fn loaded_to_memory(&self) -> bool {
        self.loaded_to_memory
    }

    /// Materializes every referenced slice (section bodies, overlay,
    /// full-headers buffer, DOS stub) into owned vectors, so the original
    /// source buffer can be dropped.
    pub fn copy_referenced_section_memory(&mut self) {
        for data in &mut self.section_data_list {
            data.copied_data();
        }
        if let Some(overlay) = &mut self.overlay {
            overlay.copied_data();
        }
        if let Some(full_headers) = &mut self.full_headers_buffer {
            full_headers.copied_data();
        }
        self.dos_stub.data.copied_data();
    }

    /// Callers must invoke this after editing `section_table` (adding or
    /// removing a section header) — mutation never triggers hidden
    /// recomputation.
    pub fn update_number_of_sections(&mut self) {
        self.file_header.value.number_of_sections = self.section_table.len() as u16;
    }

    /// Callers must invoke this after resizing or adding sections, so
    /// `size_of_image` reflects the new section table.
    pub fn update_image_size(&mut self) {
        let Some(header) = self.optional_header.as_mut() else {
            return;
        };
        let section_alignment = header.section_alignment();
        let headers_end = align_up(header.size_of_headers() as u64, section_alignment as u64);
        let sections_end = self
            .section_table
            .headers()
            .iter()
            .map(|h| h.value.virtual_address as u64 + h.value.virtual_size_aligned(section_alignment))
            .max()
            .unwrap_or(0);
        header.set_size_of_image(headers_end.max(sections_end) as u32);
    }

    /// Callers must invoke this after editing the header region, so a
    /// subsequent build/checksum sees the up-to-date bytes for any gap the
    /// parser did not otherwise decode.
    pub fn update_full_headers_buffer(&mut self, root: &InputBufferRef, size_of_headers: u64) {
        if let Ok(section) = crate::buffers::input::reduce(root, 0, size_of_headers.min(root.size())) {
            self.full_headers_buffer = Some(RefBuffer::referencing(section));
        }
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}
