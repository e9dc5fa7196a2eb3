//! The overlay — bytes past the last section's raw extent.

use crate::buffers::input::{reduce_to_end, InputBufferRef};
use crate::packed::ref_buffer::RefBuffer;

/// If the source is longer than the greatest `pointer_to_raw_data +
/// raw_size` across sections, and the image was not loaded to memory, the
/// tail is captured as the overlay.
pub fn capture_overlay(root: &InputBufferRef, end_of_sections: u64, loaded_to_memory: bool) -> Option<RefBuffer> {
    if loaded_to_memory {
        return None;
    }
    if root.size() <= end_of_sections {
        return None;
    }
    reduce_to_end(root, end_of_sections).ok().map(RefBuffer::referencing)
}
