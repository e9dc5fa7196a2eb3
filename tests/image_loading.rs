//! End-to-end coverage of the image loader, address converter, checksum,
//! and version-info tree, built from hand-assembled byte buffers rather
//! than binary fixtures.

use scroll::{Pwrite, LE};

use pebliss::buffers::input::InputBuffer;
use pebliss::buffers::output::OutputBuffer;
use pebliss::core::dos_header::{RawDosHeader, DOS_MAGIC, SIZEOF_DOS_HEADER};
use pebliss::core::file_header::{characteristics as file_characteristics, RawFileHeader, SIZEOF_FILE_HEADER};
use pebliss::core::image_signature::{RawImageSignature, PE_MAGIC, SIZEOF_IMAGE_SIGNATURE};
use pebliss::core::optional_header::{
    self, OptionalHeaderErrc, RawOptionalHeader32, RawOptionalHeader64, MAGIC_PE32, MAGIC_PE32_PLUS, SIZEOF_OPTIONAL_HEADER_32,
    SIZEOF_OPTIONAL_HEADER_64,
};
use pebliss::core::data_directories::{DirectoryEntry, RawDataDirectory};
use pebliss::core::section::header::{characteristics as section_characteristics, RawSectionHeader, SIZEOF_SECTION_HEADER};
use pebliss::directories::debug::{self, kind as debug_kind, CodeView, DecodedDebugData};
use pebliss::directories::resources::version_info::{parse_version_info, Translation};
use pebliss::image::{load, LoadOptions};
use pebliss::image::address_converter::{rva_to_file_offset, section_data_from_rva, AddressConverterErrc};
use pebliss::image::{builder, checksum};

/// A section header plus the bytes that go at its raw-data offset.
struct SectionSpec {
    header: RawSectionHeader,
    raw_data: Vec<u8>,
}

/// Assembles the common DOS/PE/file/optional-header/section-table prologue
/// shared by every scenario below, returning the full byte buffer.
fn build_image(optional_header_32: Option<RawOptionalHeader32>, optional_header_64: Option<RawOptionalHeader64>, sections: &[SectionSpec], overlay: &[u8]) -> Vec<u8> {
    assert!(optional_header_32.is_some() ^ optional_header_64.is_some());

    let e_lfanew = SIZEOF_DOS_HEADER as u64;
    let optional_header_size = if optional_header_32.is_some() {
        SIZEOF_OPTIONAL_HEADER_32
    } else {
        SIZEOF_OPTIONAL_HEADER_64
    };
    let num_data_directories = optional_header_32
        .map(|o| o.number_of_rva_and_sizes)
        .or(optional_header_64.map(|o| o.number_of_rva_and_sizes))
        .unwrap_or(0);
    let optional_header_pos = e_lfanew + SIZEOF_IMAGE_SIGNATURE as u64 + SIZEOF_FILE_HEADER as u64;
    let data_directories_pos = optional_header_pos + optional_header_size as u64;
    let section_table_pos = data_directories_pos + num_data_directories as u64 * pebliss::core::data_directories::SIZEOF_DATA_DIRECTORY as u64;
    let section_table_end = section_table_pos + sections.len() as u64 * SIZEOF_SECTION_HEADER as u64;

    let raw_end = sections
        .iter()
        .map(|s| s.header.pointer_to_raw_data as u64 + s.raw_data.len() as u64)
        .max()
        .unwrap_or(section_table_end);
    let total_len = raw_end.max(section_table_end) + overlay.len() as u64;

    let mut buf = vec![0u8; total_len as usize];

    let dos_header = RawDosHeader {
        e_magic: DOS_MAGIC,
        e_lfanew: e_lfanew as u32,
        ..Default::default()
    };
    buf.pwrite_with(dos_header, 0, LE).unwrap();
    buf.pwrite_with(RawImageSignature(PE_MAGIC), e_lfanew as usize, LE).unwrap();

    let file_header = RawFileHeader {
        machine: 0x014c,
        number_of_sections: sections.len() as u16,
        size_of_optional_header: optional_header_size as u16,
        characteristics: file_characteristics::EXECUTABLE_IMAGE,
        ..Default::default()
    };
    buf.pwrite_with(file_header, (e_lfanew + SIZEOF_IMAGE_SIGNATURE as u64) as usize, LE).unwrap();

    if let Some(oh) = optional_header_32 {
        buf.pwrite_with(oh, optional_header_pos as usize, LE).unwrap();
    }
    if let Some(oh) = optional_header_64 {
        buf.pwrite_with(oh, optional_header_pos as usize, LE).unwrap();
    }

    for (i, spec) in sections.iter().enumerate() {
        buf.pwrite_with(spec.header, (section_table_pos + i as u64 * SIZEOF_SECTION_HEADER as u64) as usize, LE)
            .unwrap();
        let start = spec.header.pointer_to_raw_data as usize;
        buf[start..start + spec.raw_data.len()].copy_from_slice(&spec.raw_data);
    }

    if !overlay.is_empty() {
        let start = (total_len as usize) - overlay.len();
        buf[start..].copy_from_slice(overlay);
    }

    buf
}

fn minimal_pe32_optional_header() -> RawOptionalHeader32 {
    RawOptionalHeader32 {
        magic: MAGIC_PE32,
        address_of_entry_point: 0x400,
        image_base: 0x0040_0000,
        section_alignment: 0x1000,
        file_alignment: 0x200,
        major_subsystem_version: 4,
        size_of_image: 0x1000,
        size_of_headers: 0x400,
        number_of_rva_and_sizes: 0,
        ..Default::default()
    }
}

#[test]
fn minimum_valid_pe32_loads_without_warnings() {
    let _ = env_logger::try_init();

    let buf = build_image(Some(minimal_pe32_optional_header()), None, &[], &[]);
    let source = InputBuffer::from_vec(buf);
    let result = load(source, LoadOptions::default());

    assert!(result.fatal_error.is_none(), "{:?}", result.fatal_error);
    assert!(!result.warnings.has_errors(), "{:?}", result.warnings);
    assert!(!result.image.is_64bit());
}

#[test]
fn invalid_dos_magic_is_a_fatal_error() {
    let mut buf = build_image(Some(minimal_pe32_optional_header()), None, &[], &[]);
    buf[0] = 0x58; // corrupt 'M' in "MZ"
    let source = InputBuffer::from_vec(buf);
    let result = load(source, LoadOptions::default());

    assert_eq!(
        result.fatal_error.map(|e| e.to_string()),
        Some(pebliss::image::loader::ImageLoaderErrc::InvalidDosSignature.to_string())
    );
}

#[test]
fn pe32_plus_has_no_base_of_data_field() {
    let oh64 = RawOptionalHeader64 {
        magic: MAGIC_PE32_PLUS,
        image_base: 0x1_4000_0000,
        section_alignment: 0x1000,
        file_alignment: 0x200,
        ..Default::default()
    };
    let mut raw = vec![0u8; SIZEOF_OPTIONAL_HEADER_64];
    raw.pwrite_with(oh64, 0, LE).unwrap();
    let source = InputBuffer::from_vec(raw);

    let header = optional_header::deserialize(&source, 0, false).expect("deserializes");
    assert!(header.is_64bit());
    assert_eq!(header.base_of_data(), Err(OptionalHeaderErrc::NoBaseOfDataField));
}

#[test]
fn section_data_from_rva_zero_fills_the_virtual_tail() {
    let section = RawSectionHeader {
        virtual_size: 0x2000,
        virtual_address: 0x1000,
        size_of_raw_data: 0x1000,
        pointer_to_raw_data: 0x400,
        characteristics: section_characteristics::CNT_CODE | section_characteristics::MEM_READ,
        ..Default::default()
    };
    let raw_data = vec![0xAAu8; 0x1000];
    let mut oh = minimal_pe32_optional_header();
    oh.size_of_image = 0x3000;
    oh.size_of_headers = 0x400;
    let buf = build_image(Some(oh), None, &[SectionSpec { header: section, raw_data }], &[]);
    let source = InputBuffer::from_vec(buf);
    let result = load(source, LoadOptions::default());
    assert!(result.fatal_error.is_none(), "{:?}", result.fatal_error);

    let fully_virtual = section_data_from_rva(&result.image, 0x2000, 0x800, false, true).expect("virtual read succeeds");
    assert_eq!(fully_virtual.to_vec(), vec![0u8; 0x800]);

    let err = section_data_from_rva(&result.image, 0x2000, 0x800, false, false).unwrap_err();
    assert_eq!(err, AddressConverterErrc::SectionNotFound);
}

#[test]
fn checksum_round_trips_through_a_rebuild() {
    let mut sections = Vec::new();
    for i in 0..3u32 {
        let header = RawSectionHeader {
            virtual_address: 0x1000 * (i + 1),
            virtual_size: 0x200,
            size_of_raw_data: 0x200,
            pointer_to_raw_data: 0x400 + 0x200 * i,
            characteristics: section_characteristics::CNT_INITIALIZED_DATA | section_characteristics::MEM_READ,
            ..Default::default()
        };
        sections.push(SectionSpec {
            header,
            raw_data: vec![i as u8; 0x200],
        });
    }
    let mut oh = minimal_pe32_optional_header();
    oh.size_of_image = 0x4000;
    oh.size_of_headers = 0x400;
    let overlay = [0x01u8, 0x02, 0x03, 0x04];
    let buf = build_image(Some(oh), None, &sections, &overlay);

    let source = InputBuffer::from_vec(buf.clone());
    let result = load(source, LoadOptions::default());
    assert!(result.fatal_error.is_none(), "{:?}", result.fatal_error);
    let mut image = result.image;

    let source_for_checksum = InputBuffer::from_vec(buf);
    let computed = checksum::compute(&image, &source_for_checksum).expect("checksum computes");
    image.optional_header.as_mut().unwrap().set_checksum(computed);

    let mut out = OutputBuffer::new_vector();
    builder::build(&image, &mut out, true).expect("image rebuilds");
    let rebuilt = out.into_vec().expect("vector sink");

    let rebuilt_source = InputBuffer::from_vec(rebuilt);
    let reloaded = load(rebuilt_source.clone(), LoadOptions::default());
    assert!(reloaded.fatal_error.is_none(), "{:?}", reloaded.fatal_error);
    assert_eq!(reloaded.image.optional_header.as_ref().unwrap().checksum(), computed);

    let recomputed = checksum::compute(&reloaded.image, &rebuilt_source).expect("checksum recomputes");
    assert_eq!(recomputed, computed);
}

/// Builds one `VS_VERSIONINFO`-style block: `{length, value_length, type,
/// utf16 key, value, children}`, matching
/// `directories::resources::version_info::parse_block`'s layout exactly.
fn build_version_block(key: &str, kind: u16, value: &[u8], children: &[Vec<u8>]) -> Vec<u8> {
    fn pad_to_align(body: &mut Vec<u8>) {
        let offset = 6 + body.len();
        let rem = offset % 4;
        if rem != 0 {
            body.extend(std::iter::repeat(0u8).take(4 - rem));
        }
    }

    let mut body = Vec::new();
    for unit in key.encode_utf16() {
        body.extend_from_slice(&unit.to_le_bytes());
    }
    body.extend_from_slice(&0u16.to_le_bytes());
    pad_to_align(&mut body);

    body.extend_from_slice(value);
    pad_to_align(&mut body);

    for (i, child) in children.iter().enumerate() {
        body.extend_from_slice(child);
        if i + 1 < children.len() {
            pad_to_align(&mut body);
        }
    }

    let value_length: u16 = if kind == 1 { (value.len() / 2) as u16 } else { value.len() as u16 };
    let length = (6 + body.len()) as u16;

    let mut out = Vec::with_capacity(6 + body.len());
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&value_length.to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&body);
    out
}

fn utf16_le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

#[test]
fn version_info_tree_exposes_translation_and_strings() {
    let product_name = build_version_block("ProductName", 1, &utf16_le("Test"), &[]);
    let string_table = build_version_block("040904B0", 1, &[], &[product_name]);
    let string_file_info = build_version_block("StringFileInfo", 1, &[], &[string_table]);

    let translation_value = [0x09u8, 0x04, 0xB0, 0x04];
    let translation = build_version_block("Translation", 0, &translation_value, &[]);
    let var_file_info = build_version_block("VarFileInfo", 1, &[], &[translation]);

    let root = build_version_block("VS_VERSION_INFO", 0, &[], &[string_file_info, var_file_info]);

    let info = parse_version_info(&root, 8).expect("parses");
    assert_eq!(info.translations, vec![Translation { lcid: 0x0409, cpid: 0x04B0 }]);

    let strings = info.strings_for(&info.translations[0]).expect("string table present");
    assert_eq!(strings.get("ProductName").map(String::as_str), Some("Test"));

    let direct = info.string_tables.get("040904B0").expect("keyed lookup");
    assert_eq!(direct.get("ProductName").map(String::as_str), Some("Test"));
}

#[test]
fn debug_directory_code_view_entry_decodes_against_a_loaded_image() {
    let _ = env_logger::try_init();

    let section_raw_pos = 0x400u32;
    let section_rva = 0x1000u32;

    // One CodeView (RSDS) descriptor, immediately followed by its payload,
    // both inside the section's raw data.
    let pdb_path = b"C:\\build\\out.pdb\0";
    let mut payload = Vec::new();
    payload.extend_from_slice(b"RSDS");
    payload.extend_from_slice(&[0xAAu8; 16]); // guid
    payload.extend_from_slice(&7u32.to_le_bytes()); // age
    payload.extend_from_slice(pdb_path);

    let descriptor = debug::RawDebugDirectory {
        characteristics: 0,
        time_date_stamp: 0,
        major_version: 0,
        minor_version: 0,
        kind: debug_kind::CODEVIEW,
        size_of_data: payload.len() as u32,
        address_of_raw_data: section_rva + debug::SIZEOF_DEBUG_DIRECTORY as u32,
        pointer_to_raw_data: section_raw_pos + debug::SIZEOF_DEBUG_DIRECTORY as u32,
    };

    let mut raw_data = vec![0u8; debug::SIZEOF_DEBUG_DIRECTORY];
    raw_data.pwrite_with(descriptor, 0, LE).unwrap();
    raw_data.extend_from_slice(&payload);

    let mut oh = minimal_pe32_optional_header();
    oh.number_of_rva_and_sizes = DirectoryEntry::Debug as u32 + 1;

    let section = RawSectionHeader {
        virtual_size: raw_data.len() as u32,
        virtual_address: section_rva,
        size_of_raw_data: raw_data.len() as u32,
        pointer_to_raw_data: section_raw_pos,
        characteristics: section_characteristics::CNT_INITIALIZED_DATA | section_characteristics::MEM_READ,
        ..Default::default()
    };

    let mut buf = build_image(Some(oh), None, &[SectionSpec { header: section, raw_data }], &[]);

    let directory_entry = RawDataDirectory {
        virtual_address: section_rva,
        size: debug::SIZEOF_DEBUG_DIRECTORY as u32,
    };
    let e_lfanew = SIZEOF_DOS_HEADER as u64;
    let optional_header_pos = e_lfanew + SIZEOF_IMAGE_SIGNATURE as u64 + SIZEOF_FILE_HEADER as u64;
    let data_directories_pos = optional_header_pos + SIZEOF_OPTIONAL_HEADER_32 as u64;
    let debug_entry_pos = data_directories_pos + DirectoryEntry::Debug as u64 * pebliss::core::data_directories::SIZEOF_DATA_DIRECTORY as u64;
    buf.pwrite_with(directory_entry, debug_entry_pos as usize, LE).unwrap();

    // `parse_debug_directory` resolves descriptor payloads by
    // `pointer_to_raw_data`, an absolute file offset, so it needs a source
    // addressed the same way the whole file is, not an already-sectioned
    // sub-buffer; keep a second handle onto the same bytes for that.
    let file_source = InputBuffer::from_vec(buf.clone());
    let source = InputBuffer::from_vec(buf);
    let result = load(source, LoadOptions::default());
    assert!(result.fatal_error.is_none(), "{:?}", result.fatal_error);
    let image = result.image;

    let debug_dir = image.data_directories.get(DirectoryEntry::Debug).expect("debug directory present");
    let rva = debug_dir.value.virtual_address;
    let size = debug_dir.value.size;
    let directory_pos = rva_to_file_offset(&image, rva).expect("debug directory rva resolves to a file offset");

    let entries = debug::parse_debug_directory(&file_source, directory_pos, size, false).expect("descriptor parses");
    assert_eq!(entries.len(), 1);

    match debug::parse_code_view(&entries[0].payload.data().to_vec()).expect("CodeView payload parses") {
        CodeView::Rsds { guid, age, pdb_path } => {
            assert_eq!(guid, [0xAAu8; 16]);
            assert_eq!(age, 7);
            assert_eq!(pdb_path, "C:\\build\\out.pdb");
        }
        other => panic!("expected an RSDS CodeView record, got {other:?}"),
    }

    match debug::decode_entry(&entries[0]) {
        Ok(DecodedDebugData::CodeView(CodeView::Rsds { age, .. })) => assert_eq!(age, 7),
        other => panic!("expected a decoded RSDS CodeView record via decode_entry, got {other:?}"),
    }
}
