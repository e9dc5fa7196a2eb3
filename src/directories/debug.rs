//! The debug directory: a sequence of fixed descriptors, each pointing at a
//! payload whose interpretation depends on a type tag.

use scroll::{Pread, Pwrite, SizeWith};
use thiserror::Error;

use crate::buffers::input::{reduce, InputBufferRef};
use crate::packed::packed_struct::{impl_fixed_layout_via_scroll, FixedLayout, PackedStruct};
use crate::packed::ref_buffer::RefBuffer;

pub const SIZEOF_DEBUG_DIRECTORY: usize = 28;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct RawDebugDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub kind: u32,
    pub size_of_data: u32,
    pub address_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}

impl_fixed_layout_via_scroll!(RawDebugDirectory, SIZEOF_DEBUG_DIRECTORY);

pub type DebugDirectoryEntry = PackedStruct<RawDebugDirectory>;

pub mod kind {
    pub const UNKNOWN: u32 = 0;
    pub const COFF: u32 = 1;
    pub const CODEVIEW: u32 = 2;
    pub const FPO: u32 = 5;
    pub const MISC: u32 = 4;
    pub const OMAP_TO_SRC: u32 = 7;
    pub const OMAP_FROM_SRC: u32 = 8;
    pub const VC_FEATURE: u32 = 12;
    pub const POGO: u32 = 13;
    pub const R2R_PERFMAP: u32 = 21;
    pub const MPX: u32 = 15;
    pub const REPRO: u32 = 16;
    pub const EX_DLLCHARACTERISTICS: u32 = 20;
    pub const SPGO: u32 = 22;
    pub const PDB_HASH: u32 = 19;
    pub const MPDB: u32 = 24;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DebugDirectoryErrc {
    #[error("unable to read a debug directory descriptor")]
    UnableToReadDescriptor,
    #[error("debug payload is outside the image")]
    InvalidPayloadRange,
    #[error("unrecognized debug directory type")]
    Unsupported,
    #[error("CodeView signature is not NB10, RSDS, or OMF")]
    InvalidCodeViewSignature,
    #[error("COFF symbol table is malformed")]
    InvalidCoffSymbolTable,
    #[error("POGO entry is malformed")]
    InvalidPogoEntry,
    #[error("FPO_DATA record is not a multiple of the fixed record size")]
    InvalidFpoRecord,
    #[error("extended DLL characteristics payload is too short")]
    InvalidExDllCharacteristics,
    #[error("MPDB entry is too short to carry a signature")]
    InvalidMpdbEntry,
}

/// One descriptor plus its captured (still-opaque) payload.
#[derive(Debug, Clone)]
pub struct DebugEntry {
    pub descriptor: DebugDirectoryEntry,
    pub payload: RefBuffer,
}

/// Reads every 28-byte descriptor in `[pos, pos + size)` and captures each
/// payload as a ref-buffer from `file_source` at `pointer_to_raw_data`.
pub fn parse_debug_directory(
    file_source: &InputBufferRef,
    pos: u64,
    size: u32,
    allow_virtual: bool,
) -> Result<Vec<DebugEntry>, DebugDirectoryErrc> {
    let count = size as u64 / SIZEOF_DEBUG_DIRECTORY as u64;
    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count {
        let descriptor = DebugDirectoryEntry::deserialize(file_source, pos + i * SIZEOF_DEBUG_DIRECTORY as u64, allow_virtual)
            .map_err(|_| DebugDirectoryErrc::UnableToReadDescriptor)?;
        let payload = reduce(
            file_source,
            descriptor.value.pointer_to_raw_data as u64,
            descriptor.value.size_of_data as u64,
        )
        .map(RefBuffer::referencing)
        .unwrap_or_else(|_| RefBuffer::owning(Vec::new()));
        entries.push(DebugEntry { descriptor, payload });
    }
    Ok(entries)
}

/// A decoded CodeView record: the PDB path plus whichever signature variant
/// produced it.
#[derive(Debug, Clone)]
pub enum CodeView {
    Nb10 { age: u32, pdb_path: String },
    Rsds { guid: [u8; 16], age: u32, pdb_path: String },
    Omf { base_name: String },
}

const CV_SIGNATURE_NB10: u32 = 0x3031_424e;
const CV_SIGNATURE_RSDS: u32 = 0x5344_5352;
const CV_SIGNATURE_OMF: u32 = 0x4d54_4f4e;

pub fn parse_code_view(payload: &[u8]) -> Result<CodeView, DebugDirectoryErrc> {
    if payload.len() < 4 {
        return Err(DebugDirectoryErrc::InvalidCodeViewSignature);
    }
    let signature = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    match signature {
        CV_SIGNATURE_NB10 if payload.len() >= 16 => {
            let age = u32::from_le_bytes(payload[12..16].try_into().unwrap());
            let pdb_path = nul_terminated_ascii(&payload[16..]);
            Ok(CodeView::Nb10 { age, pdb_path })
        }
        CV_SIGNATURE_RSDS if payload.len() >= 24 => {
            let mut guid = [0u8; 16];
            guid.copy_from_slice(&payload[4..20]);
            let age = u32::from_le_bytes(payload[20..24].try_into().unwrap());
            let pdb_path = nul_terminated_ascii(&payload[24..]);
            Ok(CodeView::Rsds { guid, age, pdb_path })
        }
        CV_SIGNATURE_OMF => Ok(CodeView::Omf {
            base_name: nul_terminated_ascii(&payload[4..]),
        }),
        _ => Err(DebugDirectoryErrc::InvalidCodeViewSignature),
    }
}

fn nul_terminated_ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// One decoded COFF symbol table entry, name resolved against the string
/// table when the 8-byte inline name field starts with a 4-byte zero.
#[derive(Debug, Clone)]
pub struct CoffSymbol {
    pub name: String,
    pub value: u32,
    pub section_number: i16,
    pub kind: u16,
}

pub fn parse_coff_symbol_table(payload: &[u8]) -> Result<Vec<CoffSymbol>, DebugDirectoryErrc> {
    if payload.len() < 4 {
        return Err(DebugDirectoryErrc::InvalidCoffSymbolTable);
    }
    let number_of_symbols = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
    const RECORD_SIZE: usize = 18;
    let strtab_offset = 4 + number_of_symbols * RECORD_SIZE;
    if strtab_offset > payload.len() {
        return Err(DebugDirectoryErrc::InvalidCoffSymbolTable);
    }
    let strtab = &payload[strtab_offset..];

    let mut symbols = Vec::with_capacity(number_of_symbols);
    let mut pos = 4;
    for _ in 0..number_of_symbols {
        let record = &payload[pos..pos + RECORD_SIZE];
        let name = if record[0..4] == [0, 0, 0, 0] {
            let str_offset = u32::from_le_bytes(record[4..8].try_into().unwrap()) as usize;
            nul_terminated_ascii(strtab.get(str_offset..).unwrap_or(&[]))
        } else {
            nul_terminated_ascii(&record[0..8])
        };
        let value = u32::from_le_bytes(record[8..12].try_into().unwrap());
        let section_number = i16::from_le_bytes(record[12..14].try_into().unwrap());
        let kind = u16::from_le_bytes(record[14..16].try_into().unwrap());
        symbols.push(CoffSymbol {
            name,
            value,
            section_number,
            kind,
        });
        pos += RECORD_SIZE;
    }
    Ok(symbols)
}

/// One POGO entry: `{rva, size, name}`, the name padded to the next 4-byte
/// boundary (including its terminator).
#[derive(Debug, Clone)]
pub struct PogoEntry {
    pub rva: u32,
    pub size: u32,
    pub name: String,
}

pub fn parse_pogo(payload: &[u8]) -> Result<Vec<PogoEntry>, DebugDirectoryErrc> {
    if payload.len() < 4 {
        return Err(DebugDirectoryErrc::InvalidPogoEntry);
    }
    let mut pos = 4; // skip the 4-byte signature (LTCG/PGI/PGO/PGU)
    let mut entries = Vec::new();
    while pos + 8 <= payload.len() {
        let rva = u32::from_le_bytes(payload[pos..pos + 4].try_into().unwrap());
        let size = u32::from_le_bytes(payload[pos + 4..pos + 8].try_into().unwrap());
        pos += 8;
        let name_start = pos;
        let name_end = payload[pos..].iter().position(|&b| b == 0).map(|i| pos + i).unwrap_or(payload.len());
        let name = String::from_utf8_lossy(&payload[name_start..name_end]).into_owned();
        pos = name_end + 1;
        pos = (pos + 3) & !3; // pad the name + terminator to 4 bytes
        entries.push(PogoEntry { rva, size, name });
    }
    Ok(entries)
}

/// One OMAP mapping: `{rva, rva_to}`.
#[derive(Debug, Clone, Copy)]
pub struct OmapEntry {
    pub rva: u32,
    pub rva_to: u32,
}

pub fn parse_omap(payload: &[u8]) -> Vec<OmapEntry> {
    payload
        .chunks_exact(8)
        .map(|c| OmapEntry {
            rva: u32::from_le_bytes(c[0..4].try_into().unwrap()),
            rva_to: u32::from_le_bytes(c[4..8].try_into().unwrap()),
        })
        .collect()
}

/// Misc debug data: an ASCII or UTF-16 tagged blob following a small header.
pub fn parse_misc(payload: &[u8]) -> Option<String> {
    if payload.len() < 12 {
        return None;
    }
    let unicode = payload[8] != 0;
    let data = &payload[12..];
    Some(if unicode {
        let units: Vec<u16> = data.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        String::from_utf16_lossy(&units[..end])
    } else {
        nul_terminated_ascii(data)
    })
}

/// PDB-hash payload: `{algorithm_name\0, raw_hash_bytes...}`. No length
/// field exists for the hash; its length is whatever remains in the buffer.
#[derive(Debug, Clone)]
pub struct PdbHash {
    pub algorithm: String,
    pub hash: Vec<u8>,
}

pub fn parse_pdb_hash(payload: &[u8]) -> Option<PdbHash> {
    let end = payload.iter().position(|&b| b == 0)?;
    let algorithm = String::from_utf8_lossy(&payload[..end]).into_owned();
    let hash = payload[end + 1..].to_vec();
    Some(PdbHash { algorithm, hash })
}

/// `repro` debug entries carry just a hash of the final binary.
pub fn parse_repro(payload: &[u8]) -> Vec<u8> {
    payload.to_vec()
}

/// SPGO debug entries are a single UTF-16 string.
pub fn parse_spgo(payload: &[u8]) -> String {
    let units: Vec<u16> = payload.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16_lossy(&units)
}

/// One FPO_DATA record: frame-pointer-omission data for a single function.
#[derive(Debug, Clone, Copy)]
pub struct FpoRecord {
    pub off_start: u32,
    pub proc_size: u32,
    pub locals_dwords: u32,
    pub params_dwords: u16,
    pub prolog_bytes: u8,
    pub saved_regs: u8,
    pub has_seh: bool,
    pub use_bp: bool,
    pub frame_kind: u8,
}

pub fn parse_fpo(payload: &[u8]) -> Result<Vec<FpoRecord>, DebugDirectoryErrc> {
    const RECORD_SIZE: usize = 16;
    if payload.len() % RECORD_SIZE != 0 {
        return Err(DebugDirectoryErrc::InvalidFpoRecord);
    }
    let mut out = Vec::with_capacity(payload.len() / RECORD_SIZE);
    for record in payload.chunks_exact(RECORD_SIZE) {
        let off_start = u32::from_le_bytes(record[0..4].try_into().unwrap());
        let proc_size = u32::from_le_bytes(record[4..8].try_into().unwrap());
        let locals_dwords = u32::from_le_bytes(record[8..12].try_into().unwrap());
        let params_dwords = u16::from_le_bytes(record[12..14].try_into().unwrap());
        let bitfield = u16::from_le_bytes(record[14..16].try_into().unwrap());
        out.push(FpoRecord {
            off_start,
            proc_size,
            locals_dwords,
            params_dwords,
            prolog_bytes: (bitfield & 0xff) as u8,
            saved_regs: ((bitfield >> 8) & 0x1f) as u8,
            has_seh: (bitfield >> 13) & 1 != 0,
            use_bp: (bitfield >> 14) & 1 != 0,
            frame_kind: ((bitfield >> 16) & 0x3) as u8,
        });
    }
    Ok(out)
}

/// MPX debug data has no publicly documented field layout; captured as the
/// raw payload bytes for a caller to interpret.
pub fn parse_mpx(payload: &[u8]) -> Vec<u8> {
    payload.to_vec()
}

/// `VC_FEATURE` counters: one `u32` per tracked compiler feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct VcFeatureData {
    pub pre_vc11: u32,
    pub c_and_cpp: u32,
    pub guard_stack: u32,
    pub sdl: u32,
    pub guard: u32,
}

pub fn parse_vc_feature(payload: &[u8]) -> VcFeatureData {
    let field = |i: usize| payload.get(i * 4..i * 4 + 4).map(|b| u32::from_le_bytes(b.try_into().unwrap())).unwrap_or(0);
    VcFeatureData {
        pre_vc11: field(0),
        c_and_cpp: field(1),
        guard_stack: field(2),
        sdl: field(3),
        guard: field(4),
    }
}

/// Extended DLL characteristics bit flags.
pub mod characteristics_ex {
    pub const CET_COMPAT: u32 = 0x0001;
    pub const CET_COMPAT_STRICT_MODE: u32 = 0x0002;
    pub const CET_SET_CONTEXT_IP_VALIDATION_RELAXED_MODE: u32 = 0x0004;
    pub const CET_DYNAMIC_APIS_ALLOW_IN_PROC: u32 = 0x0008;
    pub const CET_DOWNGRADE_SOURCE_ONLY: u32 = 0x0010;
    pub const FORWARD_CFI_COMPAT: u32 = 0x0040;
    pub const HOTPATCH_COMPATIBLE: u32 = 0x0080;
}

pub fn parse_ex_dll_characteristics(payload: &[u8]) -> Result<u32, DebugDirectoryErrc> {
    let bytes: [u8; 4] = payload.get(0..4).and_then(|b| b.try_into().ok()).ok_or(DebugDirectoryErrc::InvalidExDllCharacteristics)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Mini-PDB (`MPDB`) debug data: a 4-byte signature followed by a
/// compressed PDB blob, opaque to this crate beyond that split.
#[derive(Debug, Clone)]
pub struct MiniPdbData {
    pub signature: [u8; 4],
    pub compressed: Vec<u8>,
}

pub fn parse_mpdb(payload: &[u8]) -> Result<MiniPdbData, DebugDirectoryErrc> {
    if payload.len() < 4 {
        return Err(DebugDirectoryErrc::InvalidMpdbEntry);
    }
    let mut signature = [0u8; 4];
    signature.copy_from_slice(&payload[0..4]);
    Ok(MiniPdbData {
        signature,
        compressed: payload[4..].to_vec(),
    })
}

/// A debug directory payload, decoded according to its descriptor's `kind`.
#[derive(Debug, Clone)]
pub enum DecodedDebugData {
    CodeView(CodeView),
    CoffSymbolTable(Vec<CoffSymbol>),
    Fpo(Vec<FpoRecord>),
    Misc(Option<String>),
    Pogo(Vec<PogoEntry>),
    Omap(Vec<OmapEntry>),
    Mpx(Vec<u8>),
    VcFeature(VcFeatureData),
    ExDllCharacteristics(u32),
    Repro(Vec<u8>),
    Spgo(String),
    PdbHash(Option<PdbHash>),
    Mpdb(MiniPdbData),
}

/// Dispatches `entry`'s payload to the sub-parser its descriptor's `kind`
/// names. An unrecognized `kind` is not a parse failure in its own right
/// (the descriptor and raw payload are still available); it's reported as
/// [`DebugDirectoryErrc::Unsupported`].
pub fn decode_entry(entry: &DebugEntry) -> Result<DecodedDebugData, DebugDirectoryErrc> {
    let payload = entry.payload.data().to_vec();
    match entry.descriptor.value.kind {
        kind::CODEVIEW => parse_code_view(&payload).map(DecodedDebugData::CodeView),
        kind::COFF => parse_coff_symbol_table(&payload).map(DecodedDebugData::CoffSymbolTable),
        kind::FPO => parse_fpo(&payload).map(DecodedDebugData::Fpo),
        kind::MISC => Ok(DecodedDebugData::Misc(parse_misc(&payload))),
        kind::POGO => parse_pogo(&payload).map(DecodedDebugData::Pogo),
        kind::OMAP_TO_SRC | kind::OMAP_FROM_SRC => Ok(DecodedDebugData::Omap(parse_omap(&payload))),
        kind::MPX => Ok(DecodedDebugData::Mpx(parse_mpx(&payload))),
        kind::VC_FEATURE => Ok(DecodedDebugData::VcFeature(parse_vc_feature(&payload))),
        kind::EX_DLLCHARACTERISTICS => parse_ex_dll_characteristics(&payload).map(DecodedDebugData::ExDllCharacteristics),
        kind::REPRO => Ok(DecodedDebugData::Repro(parse_repro(&payload))),
        kind::SPGO => Ok(DecodedDebugData::Spgo(parse_spgo(&payload))),
        kind::PDB_HASH => Ok(DecodedDebugData::PdbHash(parse_pdb_hash(&payload))),
        kind::MPDB => parse_mpdb(&payload).map(DecodedDebugData::Mpdb),
        _ => Err(DebugDirectoryErrc::Unsupported),
    }
}
