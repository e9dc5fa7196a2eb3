//! Message tables: `{block_count, [low_id, high_id, entry_offset]*,
//! [entries]}`, each entry tagged ANSI / UTF-8 / UTF-16.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MessageTableErrc {
    #[error("message table is truncated")]
    Truncated,
}

/// The per-entry encoding tag, decoded from the low bits of its `flags`
/// field (`0` = ANSI, `1` = UTF-16, `4` = UTF-8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEncoding {
    Ansi,
    Utf8,
    Utf16,
}

const MESSAGE_RESOURCE_UNICODE: u16 = 1;
const MESSAGE_RESOURCE_UTF8: u16 = 4;

#[derive(Debug, Clone)]
pub struct MessageEntry {
    pub id: u32,
    pub encoding: MessageEncoding,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct MessageTable {
    pub entries: Vec<MessageEntry>,
}

/// Parses the `{block_count, [low_id, high_id, entry_offset]*, entries}`
/// layout, walking each block's entries sequentially from `entry_offset`
/// (each entry's own `length` field gives the next entry's start).
pub fn parse_message_table(payload: &[u8]) -> Result<MessageTable, MessageTableErrc> {
    if payload.len() < 4 {
        return Err(MessageTableErrc::Truncated);
    }
    let block_count = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
    let blocks_start = 4;
    let blocks_end = blocks_start + block_count * 12;
    if blocks_end > payload.len() {
        return Err(MessageTableErrc::Truncated);
    }

    let mut entries = Vec::new();
    for i in 0..block_count {
        let block = &payload[blocks_start + i * 12..blocks_start + i * 12 + 12];
        let low_id = u32::from_le_bytes(block[0..4].try_into().unwrap());
        let high_id = u32::from_le_bytes(block[4..8].try_into().unwrap());
        let entry_offset = u32::from_le_bytes(block[8..12].try_into().unwrap()) as usize;

        let mut pos = entry_offset;
        let mut id = low_id;
        while id <= high_id {
            if pos + 4 > payload.len() {
                return Err(MessageTableErrc::Truncated);
            }
            let length = u16::from_le_bytes(payload[pos..pos + 2].try_into().unwrap()) as usize;
            let flags = u16::from_le_bytes(payload[pos + 2..pos + 4].try_into().unwrap());
            if length < 4 || pos + length > payload.len() {
                return Err(MessageTableErrc::Truncated);
            }
            let body = &payload[pos + 4..pos + length];

            let (encoding, text) = if flags & MESSAGE_RESOURCE_UTF8 != 0 {
                (MessageEncoding::Utf8, String::from_utf8_lossy(trim_nul(body)).into_owned())
            } else if flags & MESSAGE_RESOURCE_UNICODE != 0 {
                let units: Vec<u16> = body.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
                let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
                (MessageEncoding::Utf16, String::from_utf16_lossy(&units[..end]))
            } else {
                (MessageEncoding::Ansi, String::from_utf8_lossy(trim_nul(body)).into_owned())
            };

            entries.push(MessageEntry { id, encoding, text });
            pos += length;
            id += 1;
        }
    }

    Ok(MessageTable { entries })
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}
