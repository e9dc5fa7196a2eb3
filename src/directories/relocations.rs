//! Base relocations: blocks of `{page_rva, block_size}` followed by 16-bit
//! type+offset entries, each patchable against a machine-specific
//! `apply_to`.

use thiserror::Error;

use crate::buffers::input::InputBuffer;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RelocationErrc {
    #[error("unable to read a relocation block header")]
    UnableToReadBlockHeader,
    #[error("block_size is smaller than the 8-byte header")]
    InvalidBlockSize,
    #[error("HIGHADJ entry is missing its parameter entry")]
    MissingHighAdjParameter,
}

pub mod kind {
    pub const ABSOLUTE: u16 = 0;
    pub const HIGH: u16 = 1;
    pub const LOW: u16 = 2;
    pub const HIGHLOW: u16 = 3;
    pub const HIGHADJ: u16 = 4;
    pub const MIPS_JMPADDR: u16 = 5;
    pub const ARM_MOV32: u16 = 5;
    pub const RISCV_HIGH20: u16 = 5;
    pub const THUMB_MOV32: u16 = 7;
    pub const RISCV_LOW12I: u16 = 7;
    pub const RISCV_LOW12S: u16 = 8;
    pub const DIR64: u16 = 10;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    pub kind: u16,
    pub offset_in_page: u16,
    /// The `HIGHADJ` parameter word, when `kind == HIGHADJ`.
    pub highadj_param: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct RelocationBlock {
    pub page_rva: u32,
    pub entries: Vec<RelocationEntry>,
}

/// Reads every relocation block in `[pos, pos + size)`.
pub fn parse_base_relocations(buffer: &InputBuffer, pos: u64, size: u32) -> Result<Vec<RelocationBlock>, RelocationErrc> {
    let end = pos + size as u64;
    let mut offset = pos;
    let mut blocks = Vec::new();

    while offset + 8 <= end {
        let mut header = [0u8; 8];
        if buffer.read(offset, &mut header) < 8 {
            return Err(RelocationErrc::UnableToReadBlockHeader);
        }
        let page_rva = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let block_size = u32::from_le_bytes(header[4..8].try_into().unwrap());
        if block_size < 8 {
            return Err(RelocationErrc::InvalidBlockSize);
        }
        let entry_count = (block_size as u64 - 8) / 2;

        let mut entries = Vec::with_capacity(entry_count as usize);
        let mut entry_pos = offset + 8;
        let mut remaining = entry_count;
        while remaining > 0 {
            let mut raw = [0u8; 2];
            buffer.read(entry_pos, &mut raw);
            let word = u16::from_le_bytes(raw);
            let kind = word >> 12;
            let offset_in_page = word & 0x0fff;
            entry_pos += 2;
            remaining -= 1;

            let highadj_param = if kind == self::kind::HIGHADJ {
                if remaining == 0 {
                    return Err(RelocationErrc::MissingHighAdjParameter);
                }
                let mut param_raw = [0u8; 2];
                buffer.read(entry_pos, &mut param_raw);
                entry_pos += 2;
                remaining -= 1;
                Some(u16::from_le_bytes(param_raw))
            } else {
                None
            };

            entries.push(RelocationEntry {
                kind,
                offset_in_page,
                highadj_param,
            });
        }

        blocks.push(RelocationBlock { page_rva, entries });
        offset += block_size as u64;
    }
    Ok(blocks)
}

/// Machine type discriminant for [`RelocationEntry::apply_to`], mirroring
/// the COFF file header's `machine` field values this crate cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    X86,
    X64,
    Arm,
    Thumb,
    Arm64,
    RiscV,
    Mips,
}

impl RelocationEntry {
    /// Patches `value` (the original bytes read at `page_rva + offset_in_page`,
    /// widened to `u64`) by `image_base_difference`, dispatching on `machine`
    /// only for the entry kinds whose patch width differs from
    /// `HIGHLOW`/`DIR64`.
    pub fn apply_to(&self, value: u64, image_base_difference: i64, machine: Machine) -> u64 {
        match self.kind {
            kind::ABSOLUTE => value,
            kind::HIGH => ((value as u32).wrapping_add((image_base_difference >> 16) as u32) & 0xffff) as u64 | (value & !0xffff),
            kind::LOW => (value as u16).wrapping_add(image_base_difference as u16) as u64 | (value & !0xffff),
            kind::HIGHLOW => (value as u32).wrapping_add(image_base_difference as u32) as u64,
            kind::HIGHADJ => {
                let adj = ((self.highadj_param.unwrap_or(0) as u32) << 16) | (value as u32 & 0xffff);
                adj.wrapping_add(image_base_difference as u32) as u64
            }
            kind::DIR64 => value.wrapping_add(image_base_difference as u64),
            5 if machine == Machine::Arm || machine == Machine::Thumb => {
                value.wrapping_add(image_base_difference as u64)
            }
            5 if machine == Machine::RiscV => value.wrapping_add(image_base_difference as u64),
            7 if machine == Machine::Thumb || machine == Machine::RiscV => value.wrapping_add(image_base_difference as u64),
            8 if machine == Machine::RiscV => value.wrapping_add(image_base_difference as u64),
            5 if machine == Machine::Mips => value.wrapping_add(image_base_difference as u64),
            _ => value,
        }
    }
}
