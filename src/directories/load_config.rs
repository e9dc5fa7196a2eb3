//! The load-config directory. The descriptor is size-prefixed and has grown
//! with every Windows version; the parser reads the leading `u32` size and
//! decodes only as many trailing fields as that size covers, inferring a
//! rough "version" from how far the size reaches.

use thiserror::Error;

use crate::buffers::input::InputBuffer;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoadConfigErrc {
    #[error("unable to read the load-config size field")]
    UnableToReadSize,
    #[error("declared size exceeds the directory's own size")]
    InvalidSize,
    #[error("a conditional sub-table's entry count exceeds the configured budget")]
    EntryBudgetExceeded,
}

/// How much of the full Windows load-config layout was physically present,
/// inferred from the leading size field rather than carried as an enum —
/// callers compare against the offsets below directly.
#[derive(Debug, Clone)]
pub struct LoadConfigDirectory {
    pub size: u32,
    pub raw: Vec<u8>,
}

/// Byte offsets (from the start of the directory) of fields this reads,
/// matching the 32-bit layout; PE32+ shifts pointer-sized fields but the
/// offsets used below are all within the common prefix.
mod offset {
    pub const TIME_DATE_STAMP: usize = 4;
    pub const SECURITY_COOKIE: usize = 0x3c;
    pub const SEH_TABLE: usize = 0x40; // ptr, then count follows at +ptr_size
    pub const GUARD_CF_CHECK_FUNCTION_PTR: usize = 0x58;
    pub const GUARD_CF_FUNCTION_TABLE: usize = 0x70;
    pub const GUARD_CF_FUNCTION_COUNT: usize = 0x78;
    pub const GUARD_FLAGS: usize = 0x7c;
    pub const GUARD_ADDRESS_TAKEN_IAT_ENTRY_TABLE: usize = 0x90;
    pub const GUARD_ADDRESS_TAKEN_IAT_ENTRY_COUNT: usize = 0x98;
    pub const GUARD_LONG_JUMP_TARGET_TABLE: usize = 0xa0;
    pub const GUARD_LONG_JUMP_TARGET_COUNT: usize = 0xa8;
    pub const DYNAMIC_VALUE_RELOC_TABLE_OFFSET: usize = 0xb8;
    pub const CHPE_METADATA_POINTER: usize = 0xc0;
    pub const ENCLAVE_CONFIG_PTR: usize = 0xd0;
    pub const VOLATILE_METADATA_PTR: usize = 0xe0;
    pub const GUARD_EH_CONTINUATION_TABLE: usize = 0xf0;
    pub const GUARD_EH_CONTINUATION_COUNT: usize = 0xf8;
}

pub const GUARD_CF_INSTRUMENTED: u32 = 0x0000_0100;
pub const GUARD_CF_FUNCTION_TABLE_PRESENT: u32 = 0x0000_0400;
pub const GUARD_CF_EXPORT_SUPPRESSION_INFO_PRESENT: u32 = 0x0000_4000;
pub const GUARD_CF_LONGJUMP_TABLE_PRESENT: u32 = 0x0001_0000;
pub const GUARD_EH_CONTINUATION_TABLE_PRESENT: u32 = 0x0400_0000;
pub const GUARD_CF_STRIDE_MASK: u32 = 0xf000_0000;
pub const GUARD_CF_STRIDE_SHIFT: u32 = 28;
pub const GUARD_XFG_ENABLED: u32 = 0x0080_0000;

/// XFG type-based hashes sit immediately before the function they describe;
/// the caller resolves this RVA against the loaded image (via
/// `image::address_converter`) to fetch the 8-byte hash.
pub const XFG_HASH_SIZE: u64 = 8;

pub fn xfg_hash_rva(function_rva: u32) -> u64 {
    function_rva as u64 - XFG_HASH_SIZE
}

impl LoadConfigDirectory {
    pub fn deserialize(buffer: &InputBuffer, pos: u64, directory_size: u32) -> Result<Self, LoadConfigErrc> {
        let mut size_bytes = [0u8; 4];
        if buffer.read(pos, &mut size_bytes) < 4 {
            return Err(LoadConfigErrc::UnableToReadSize);
        }
        let size = u32::from_le_bytes(size_bytes);
        if size > directory_size {
            return Err(LoadConfigErrc::InvalidSize);
        }
        let mut raw = vec![0u8; size as usize];
        buffer.read(pos, &mut raw);
        Ok(LoadConfigDirectory { size, raw })
    }

    fn field_u32(&self, off: usize) -> Option<u32> {
        self.raw.get(off..off + 4).map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    fn field_u64(&self, off: usize) -> Option<u64> {
        self.raw.get(off..off + 8).map(|b| u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn time_date_stamp(&self) -> Option<u32> {
        self.field_u32(offset::TIME_DATE_STAMP)
    }

    pub fn security_cookie_rva(&self) -> Option<u64> {
        self.field_u64(offset::SECURITY_COOKIE)
    }

    pub fn guard_flags(&self) -> Option<u32> {
        self.field_u32(offset::GUARD_FLAGS)
    }

    /// The CF guard function table stride in bytes beyond the base RVA
    /// entry, decoded from the high nibble of `guard_flags`.
    pub fn guard_cf_function_table_stride(&self) -> Option<u32> {
        Some((self.guard_flags()? & GUARD_CF_STRIDE_MASK) >> GUARD_CF_STRIDE_SHIFT)
    }

    /// SafeSEH handler table: `(table_va, count)`, present whenever the
    /// directory reaches the SEH fields regardless of flags.
    pub fn seh_table(&self) -> Option<(u64, u32)> {
        let va = self.field_u64(offset::SEH_TABLE)?;
        let count = self.field_u32(offset::SEH_TABLE + 8)?;
        Some((va, count))
    }

    pub fn guard_cf_function_table(&self) -> Option<(u64, u32)> {
        if self.guard_flags()? & GUARD_CF_FUNCTION_TABLE_PRESENT == 0 {
            return None;
        }
        Some((self.field_u64(offset::GUARD_CF_FUNCTION_TABLE)?, self.field_u32(offset::GUARD_CF_FUNCTION_COUNT)?))
    }

    pub fn guard_address_taken_iat_entry_table(&self) -> Option<(u64, u32)> {
        if self.guard_flags()? & GUARD_CF_EXPORT_SUPPRESSION_INFO_PRESENT == 0 {
            return None;
        }
        Some((
            self.field_u64(offset::GUARD_ADDRESS_TAKEN_IAT_ENTRY_TABLE)?,
            self.field_u32(offset::GUARD_ADDRESS_TAKEN_IAT_ENTRY_COUNT)?,
        ))
    }

    pub fn guard_long_jump_target_table(&self) -> Option<(u64, u32)> {
        if self.guard_flags()? & GUARD_CF_LONGJUMP_TABLE_PRESENT == 0 {
            return None;
        }
        Some((
            self.field_u64(offset::GUARD_LONG_JUMP_TARGET_TABLE)?,
            self.field_u32(offset::GUARD_LONG_JUMP_TARGET_COUNT)?,
        ))
    }

    pub fn guard_eh_continuation_table(&self) -> Option<(u64, u32)> {
        if self.guard_flags()? & GUARD_EH_CONTINUATION_TABLE_PRESENT == 0 {
            return None;
        }
        Some((
            self.field_u64(offset::GUARD_EH_CONTINUATION_TABLE)?,
            self.field_u32(offset::GUARD_EH_CONTINUATION_COUNT)?,
        ))
    }

    pub fn dynamic_value_reloc_table_offset(&self) -> Option<u64> {
        self.field_u64(offset::DYNAMIC_VALUE_RELOC_TABLE_OFFSET)
    }

    pub fn chpe_metadata_ptr(&self) -> Option<u64> {
        self.field_u64(offset::CHPE_METADATA_POINTER)
    }

    pub fn is_xfg_enabled(&self) -> bool {
        self.guard_flags().unwrap_or(0) & GUARD_XFG_ENABLED != 0
    }

    pub fn enclave_config_ptr(&self) -> Option<u64> {
        self.field_u64(offset::ENCLAVE_CONFIG_PTR)
    }

    pub fn volatile_metadata_ptr(&self) -> Option<u64> {
        self.field_u64(offset::VOLATILE_METADATA_PTR)
    }
}

/// Reads a zero-terminated VA array (the lock-prefix table, or any other
/// zero-terminated pointer array in this directory), capped at
/// `max_entries`.
pub fn read_va_array(buffer: &InputBuffer, pos: u64, is_64bit: bool, max_entries: usize) -> Result<Vec<u64>, LoadConfigErrc> {
    let stride = if is_64bit { 8 } else { 4 };
    let mut out = Vec::new();
    let mut offset = pos;
    for _ in 0..max_entries {
        let mut bytes = [0u8; 8];
        let n = buffer.read(offset, &mut bytes[..stride]);
        if n < stride {
            break;
        }
        let value = if is_64bit {
            u64::from_le_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes[..4].try_into().unwrap()) as u64
        };
        if value == 0 {
            break;
        }
        out.push(value);
        offset += stride as u64;
    }
    if out.len() >= max_entries {
        return Err(LoadConfigErrc::EntryBudgetExceeded);
    }
    Ok(out)
}

/// Dynamic relocation table entries: a `(symbol, rvas)` list. Only the v1
/// fixed-size-per-symbol layout is decoded in full; the v2 variable-stride
/// ARM64X/RF-guard sub-variants are surfaced as their raw per-block bytes
/// for a caller to interpret further.
#[derive(Debug, Clone)]
pub struct DynamicRelocationBlock {
    pub symbol: u64,
    pub base_reloc_size: u32,
    pub raw: Vec<u8>,
}

pub fn parse_dynamic_relocation_table_v1(buffer: &InputBuffer, pos: u64, size: u32, max_entries: usize) -> Vec<DynamicRelocationBlock> {
    let mut out = Vec::new();
    let mut offset = pos;
    let end = pos + size as u64;
    while offset + 12 <= end && out.len() < max_entries {
        let mut header = [0u8; 12];
        if buffer.read(offset, &mut header) < 12 {
            break;
        }
        let symbol = u32::from_le_bytes(header[0..4].try_into().unwrap()) as u64;
        let block_size = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let base_reloc_size = u32::from_le_bytes(header[8..12].try_into().unwrap());
        let body_len = (block_size as u64).saturating_sub(8).min(end.saturating_sub(offset + 8));
        let mut raw = vec![0u8; body_len as usize];
        buffer.read(offset + 8, &mut raw);
        out.push(DynamicRelocationBlock {
            symbol,
            base_reloc_size,
            raw,
        });
        if block_size == 0 {
            break;
        }
        offset += block_size as u64;
    }
    out
}

/// One CF guard function table entry: the function's RVA plus whatever
/// stride-width metadata bytes follow it.
#[derive(Debug, Clone)]
pub struct GuardCfFunctionEntry {
    pub rva: u32,
    pub metadata: Vec<u8>,
}

/// Decodes the CF guard function table at `table_va`: `count` entries of
/// `4 + stride` bytes each, sorted by RVA. When `is_xfg_enabled` is set on
/// the owning directory, each entry's XFG hash lives at
/// [`xfg_hash_rva`]`(entry.rva)` in the loaded image, not in this table;
/// resolving that RVA is left to the caller.
pub fn parse_guard_cf_function_table(
    buffer: &InputBuffer,
    table_va: u64,
    count: u32,
    stride: u32,
    max_entries: usize,
) -> Result<Vec<GuardCfFunctionEntry>, LoadConfigErrc> {
    if count as usize > max_entries {
        return Err(LoadConfigErrc::EntryBudgetExceeded);
    }
    let entry_size = 4 + stride as u64;
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count as u64 {
        let entry_pos = table_va + i * entry_size;
        let mut rva_bytes = [0u8; 4];
        if buffer.read(entry_pos, &mut rva_bytes) < 4 {
            break;
        }
        let mut metadata = vec![0u8; stride as usize];
        if stride > 0 {
            buffer.read(entry_pos + 4, &mut metadata);
        }
        out.push(GuardCfFunctionEntry {
            rva: u32::from_le_bytes(rva_bytes),
            metadata,
        });
    }
    Ok(out)
}

/// Hybrid-PE (CHPE) metadata: ARM64X or x86, with a version-dependent
/// trailing layout this crate doesn't interpret field-by-field, followed
/// by a range-entry array describing which RVA ranges run under which ISA.
#[derive(Debug, Clone)]
pub struct ChpeMetadata {
    pub version: u32,
    pub raw: Vec<u8>,
}

pub fn parse_chpe_metadata(buffer: &InputBuffer, pos: u64, declared_size: u64) -> Result<ChpeMetadata, LoadConfigErrc> {
    if declared_size < 4 {
        return Err(LoadConfigErrc::InvalidSize);
    }
    let mut version_bytes = [0u8; 4];
    if buffer.read(pos, &mut version_bytes) < 4 {
        return Err(LoadConfigErrc::UnableToReadSize);
    }
    let mut raw = vec![0u8; declared_size as usize];
    buffer.read(pos, &mut raw);
    Ok(ChpeMetadata {
        version: u32::from_le_bytes(version_bytes),
        raw,
    })
}

/// One entry of a CHPE range-entry array: an RVA with its low bit marking
/// the range as ARM64EC/x64 code rather than native ARM64.
#[derive(Debug, Clone, Copy)]
pub struct ChpeRangeEntry {
    pub start_rva: u32,
    pub is_ec_code: bool,
}

pub fn parse_chpe_range_entries(buffer: &InputBuffer, pos: u64, count: u32, max_entries: usize) -> Result<Vec<ChpeRangeEntry>, LoadConfigErrc> {
    if count as usize > max_entries {
        return Err(LoadConfigErrc::EntryBudgetExceeded);
    }
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count as u64 {
        let mut bytes = [0u8; 4];
        if buffer.read(pos + i * 4, &mut bytes) < 4 {
            break;
        }
        let raw = u32::from_le_bytes(bytes);
        out.push(ChpeRangeEntry {
            start_rva: raw & !1,
            is_ec_code: raw & 1 != 0,
        });
    }
    Ok(out)
}
