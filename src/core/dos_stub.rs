//! The DOS stub — the bytes between the DOS header and `e_lfanew`. Not
//! interpreted by the loader; carried as an opaque [`RefBuffer`]. The
//! optional "Rich" header reader below is a supplementary, non-fatal decode
//! never invoked by the loader itself.

use crate::packed::ref_buffer::RefBuffer;

#[derive(Debug, Clone)]
pub struct DosStub {
    pub data: RefBuffer,
}

/// One decoded `Rich` header entry: a `(build_id, product_id, use_count)`
/// triple, XOR-masked in the file with a per-image checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RichEntry {
    pub build_id: u16,
    pub product_id: u16,
    pub use_count: u32,
}

#[derive(Debug, Clone)]
pub struct RichHeader {
    pub checksum: u32,
    pub entries: Vec<RichEntry>,
}

const DANS_MAGIC: u32 = 0x536e_6144; // "DanS" xor-decoded marker
const RICH_MAGIC: u32 = 0x6863_6952; // "Rich"

/// Best-effort scan for a `DanS`...`Rich` block inside the stub. Returns
/// `None` rather than erroring on anything that doesn't look like a Rich
/// header — it is explicitly out of the core's interpretation, so failure
/// here is never fatal and never recorded in an `ErrorList`.
pub fn try_parse_rich_header(stub_bytes: &[u8]) -> Option<RichHeader> {
    // Find the trailing "Rich" marker and the checksum that follows it.
    let rich_pos = find_u32_le(stub_bytes, RICH_MAGIC)?;
    if rich_pos + 8 > stub_bytes.len() {
        return None;
    }
    let checksum = u32::from_le_bytes(stub_bytes[rich_pos + 4..rich_pos + 8].try_into().ok()?);

    // Everything from the DanS marker up to "Rich" is XOR-masked with
    // `checksum`, in 4-byte words, preceded by three padding words.
    let mut xored = Vec::new();
    for chunk in stub_bytes[..rich_pos].chunks_exact(4) {
        let word = u32::from_le_bytes(chunk.try_into().ok()?);
        xored.push(word ^ checksum);
    }
    let dans_pos = xored.iter().position(|&w| w == DANS_MAGIC)?;
    let body = &xored[dans_pos + 1..];
    // Three reserved zero padding words follow `DanS`.
    let body = body.strip_prefix(&[0u32, 0u32, 0u32]).unwrap_or(body);

    let mut entries = Vec::new();
    for pair in body.chunks_exact(2) {
        let [ids, use_count] = [pair[0], pair[1]];
        entries.push(RichEntry {
            build_id: (ids & 0xFFFF) as u16,
            product_id: (ids >> 16) as u16,
            use_count,
        });
    }
    Some(RichHeader { checksum, entries })
}

fn find_u32_le(data: &[u8], needle: u32) -> Option<usize> {
    let needle_bytes = needle.to_le_bytes();
    data.windows(4).position(|w| w == needle_bytes)
}
