//! NUL-terminated packed strings (ASCII and UTF-16), where the terminator
//! itself may be virtual.

use crate::buffers::InputBuffer;

use super::state::PackedState;

const READ_CHUNK: usize = 64;

/// An ASCII NUL-terminated string.
#[derive(Debug, Clone)]
pub struct PackedCString {
    pub state: PackedState,
    /// Whether the terminator was actually read from the source, or
    /// imputed because the source ran out first.
    pub terminator_is_virtual: bool,
    bytes: Vec<u8>,
}

impl PackedCString {
    pub fn deserialize(buffer: &InputBuffer, pos: u64, max_length: Option<usize>) -> Self {
        let mut bytes = Vec::new();
        let mut offset = pos;
        let mut chunk = [0u8; READ_CHUNK];
        let mut terminator_is_virtual = true;
        'outer: loop {
            let n = buffer.read(offset, &mut chunk);
            if n == 0 {
                break;
            }
            for &b in &chunk[..n] {
                if b == 0 {
                    terminator_is_virtual = false;
                    break 'outer;
                }
                bytes.push(b);
                if let Some(max) = max_length {
                    if bytes.len() >= max {
                        break 'outer;
                    }
                }
            }
            offset += n as u64;
        }
        PackedCString {
            state: PackedState::capture(buffer, pos),
            terminator_is_virtual,
            bytes,
        }
    }

    /// Total bytes consumed from the source, including the terminator when
    /// it was physically present.
    pub fn physical_size(&self) -> usize {
        self.bytes.len() + usize::from(!self.terminator_is_virtual)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.bytes.clone();
        out.push(0);
        out
    }
}

/// A UTF-16LE NUL-terminated string.
#[derive(Debug, Clone)]
pub struct PackedUtf16CString {
    pub state: PackedState,
    pub terminator_is_virtual: bool,
    units: Vec<u16>,
}

impl PackedUtf16CString {
    pub fn deserialize(buffer: &InputBuffer, pos: u64, max_length: Option<usize>) -> Self {
        let mut units = Vec::new();
        let mut offset = pos;
        let mut terminator_is_virtual = true;
        loop {
            let mut pair = [0u8; 2];
            let n = buffer.read(offset, &mut pair);
            if n < 2 {
                break;
            }
            let unit = u16::from_le_bytes(pair);
            offset += 2;
            if unit == 0 {
                terminator_is_virtual = false;
                break;
            }
            units.push(unit);
            if let Some(max) = max_length {
                if units.len() >= max {
                    break;
                }
            }
        }
        PackedUtf16CString {
            state: PackedState::capture(buffer, pos),
            terminator_is_virtual,
            units,
        }
    }

    pub fn physical_size(&self) -> usize {
        (units_len(self) + usize::from(!self.terminator_is_virtual)) * 2
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.units.len() * 2 + 2);
        for u in &self.units {
            out.extend_from_slice(&u.to_le_bytes());
        }
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }
}

fn units_len(s: &PackedUtf16CString) -> usize {
    s.units.len()
}
