//! A value that either references a slice of some input buffer or owns a
//! copied byte vector.

use std::sync::Arc;

use thiserror::Error;

use crate::buffers::input::InputBufferRef;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RefBufferErrc {
    #[error("ref-buffer is empty")]
    Empty,
}

#[derive(Debug, Clone)]
enum RefBufferState {
    Referenced(InputBufferRef),
    Owned(Arc<[u8]>),
}

/// Lazily-parsed directory data: cheap to construct over an existing
/// buffer, and convertible (once, idempotently) to an owned copy.
#[derive(Debug, Clone)]
pub struct RefBuffer {
    state: RefBufferState,
}

impl RefBuffer {
    pub fn referencing(buffer: InputBufferRef) -> Self {
        RefBuffer {
            state: RefBufferState::Referenced(buffer),
        }
    }

    pub fn owning(data: impl Into<Arc<[u8]>>) -> Self {
        RefBuffer {
            state: RefBufferState::Owned(data.into()),
        }
    }

    pub fn is_referenced(&self) -> bool {
        matches!(self.state, RefBufferState::Referenced(_))
    }

    pub fn size(&self) -> u64 {
        match &self.state {
            RefBufferState::Referenced(b) => b.size(),
            RefBufferState::Owned(v) => v.len() as u64,
        }
    }

    pub fn data(&self) -> InputBufferRef {
        match &self.state {
            RefBufferState::Referenced(b) => b.clone(),
            RefBufferState::Owned(v) => crate::buffers::InputBuffer::from_slice(v.clone()),
        }
    }

    /// Returns the owned byte form, materializing it (copy-on-first-call)
    /// if this value is currently a reference. One-way: referencing ->
    /// owned never reverses.
    pub fn copied_data(&mut self) -> Arc<[u8]> {
        match &self.state {
            RefBufferState::Owned(v) => v.clone(),
            RefBufferState::Referenced(b) => {
                let v: Arc<[u8]> = b.to_vec().into();
                self.state = RefBufferState::Owned(v.clone());
                v
            }
        }
    }

    /// Writes the underlying bytes to an output buffer.
    pub fn serialize(&self, dst: &mut crate::buffers::OutputBuffer<'_>, write_virtual_tail: bool) -> u64 {
        let buf = self.data();
        let size = if write_virtual_tail {
            buf.size()
        } else {
            buf.physical_size()
        };
        crate::buffers::copy::buffer_copy(&buf, 0, size, dst)
    }
}
