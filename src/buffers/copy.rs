//! `buffer_copy` — streams bytes from an [`InputBuffer`] into an
//! [`OutputBuffer`] without materializing the whole range, used by the
//! image builder to emit section bodies and the overlay.

use super::input::InputBuffer;
use super::output::OutputBuffer;

const CHUNK: usize = 64 * 1024;

/// Copies `size` logical bytes of `src` starting at `src_offset` into `dst`
/// at its current `wpos`, in bounded chunks. Virtual (zero) tails of `src`
/// are copied as zero bytes, matching `ref_buffer::serialize`'s
/// `write_virtual_part` contract.
pub fn buffer_copy(src: &InputBuffer, src_offset: u64, size: u64, dst: &mut OutputBuffer<'_>) -> u64 {
    let mut remaining = size;
    let mut pos = src_offset;
    let mut written = 0u64;
    let mut chunk = vec![0u8; CHUNK.min(size as usize).max(1)];
    while remaining > 0 {
        let n = (remaining as usize).min(chunk.len());
        src.read(pos, &mut chunk[..n]);
        let w = dst.write(&chunk[..n]) as u64;
        written += w;
        if w < n as u64 {
            break;
        }
        pos += n as u64;
        remaining -= n as u64;
    }
    written
}
