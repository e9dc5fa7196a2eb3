//! `VS_VERSIONINFO`: a recursive block structure, `{length, value_length,
//! type, utf16_key, [value], [children]}`, each child aligned to 4 bytes
//! from its parent's start.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VersionInfoErrc {
    #[error("version info block is truncated")]
    Truncated,
    #[error("version info tree depth exceeds the configured limit")]
    DepthExceeded,
}

/// One `{length, value_length, type, key, value, children}` block.
#[derive(Debug, Clone)]
pub struct Block {
    pub key: String,
    pub is_text: bool,
    pub value: Vec<u8>,
    pub children: Vec<Block>,
}

impl Block {
    pub fn child(&self, key: &str) -> Option<&Block> {
        self.children.iter().find(|c| c.key == key)
    }
}

/// A `VarFileInfo\Translation` entry: one `(language, codepage)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub lcid: u16,
    pub cpid: u16,
}

#[derive(Debug, Clone)]
pub struct VersionInfo {
    pub root: Block,
    pub translations: Vec<Translation>,
    /// Keyed by the eight-hex-digit translation string (e.g. `"040904B0"`).
    pub string_tables: HashMap<String, HashMap<String, String>>,
}

fn align4(x: usize) -> usize {
    (x + 3) & !3
}

fn read_utf16_cstr(data: &[u8], start: usize) -> Result<(String, usize), VersionInfoErrc> {
    let mut i = start;
    let mut units = Vec::new();
    loop {
        if i + 2 > data.len() {
            return Err(VersionInfoErrc::Truncated);
        }
        let unit = u16::from_le_bytes([data[i], data[i + 1]]);
        i += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Ok((String::from_utf16_lossy(&units), i))
}

fn parse_block(data: &[u8], pos: usize, depth: u32, max_depth: u32) -> Result<(Block, usize), VersionInfoErrc> {
    if depth > max_depth {
        return Err(VersionInfoErrc::DepthExceeded);
    }
    if pos + 6 > data.len() {
        return Err(VersionInfoErrc::Truncated);
    }
    let length = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
    let value_length = u16::from_le_bytes([data[pos + 2], data[pos + 3]]) as usize;
    let kind = u16::from_le_bytes([data[pos + 4], data[pos + 5]]);
    let end = pos + length;
    if length < 6 || end > data.len() {
        return Err(VersionInfoErrc::Truncated);
    }

    let (key, after_key) = read_utf16_cstr(data, pos + 6)?;
    let value_start = align4(after_key - pos) + pos;
    let is_text = kind == 1;
    let value_size = if is_text { value_length * 2 } else { value_length };
    let value_end = value_start + value_size;
    if value_end > end {
        return Err(VersionInfoErrc::Truncated);
    }
    let value = data[value_start..value_end].to_vec();

    let mut cursor = align4(value_end - pos) + pos;
    let mut children = Vec::new();
    while cursor + 6 <= end {
        let (child, next) = parse_block(data, cursor, depth + 1, max_depth)?;
        children.push(child);
        cursor = align4(next - pos) + pos;
    }

    Ok((Block { key, is_text, value, children }, end))
}

/// Parses a `VS_VERSIONINFO` payload into its root block plus the
/// `VarFileInfo\Translation` list and `StringFileInfo` tables keyed by
/// translation string.
pub fn parse_version_info(payload: &[u8], max_depth: u32) -> Result<VersionInfo, VersionInfoErrc> {
    let (root, _) = parse_block(payload, 0, 0, max_depth)?;

    let mut translations = Vec::new();
    if let Some(var_file_info) = root.child("VarFileInfo") {
        if let Some(translation) = var_file_info.child("Translation") {
            for pair in translation.value.chunks_exact(4) {
                let lcid = u16::from_le_bytes([pair[0], pair[1]]);
                let cpid = u16::from_le_bytes([pair[2], pair[3]]);
                translations.push(Translation { lcid, cpid });
            }
        }
    }

    let mut string_tables = HashMap::new();
    if let Some(string_file_info) = root.child("StringFileInfo") {
        for table in &string_file_info.children {
            let mut strings = HashMap::new();
            for entry in &table.children {
                if entry.is_text {
                    let units: Vec<u16> = entry.value.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
                    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
                    strings.insert(entry.key.clone(), String::from_utf16_lossy(&units[..end]));
                }
            }
            string_tables.insert(table.key.clone(), strings);
        }
    }

    Ok(VersionInfo {
        root,
        translations,
        string_tables,
    })
}

impl VersionInfo {
    pub fn strings_for(&self, translation: &Translation) -> Option<&HashMap<String, String>> {
        let key = format!("{:04X}{:04X}", translation.lcid, translation.cpid);
        self.string_tables.get(&key)
    }
}
