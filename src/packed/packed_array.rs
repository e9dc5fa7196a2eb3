//! Packed byte array / vector: fixed-max or dynamic byte sequences sharing
//! the `state` + `physical_size` + `data_size` contract.

use crate::buffers::InputBuffer;

use super::state::PackedState;

/// A dynamically-sized packed byte sequence. `data_size` may exceed
/// `physical_size`, in which case the tail is virtual: reads as zero, and
/// `serialize(true)` emits zeros for it.
#[derive(Debug, Clone)]
pub struct PackedByteVector {
    pub state: PackedState,
    /// Logical length, including any virtual tail.
    pub data_size: usize,
    physical: Vec<u8>,
}

impl PackedByteVector {
    /// Reads `data_size` bytes at `pos`. Never fails: whatever cannot be
    /// read physically becomes the virtual tail (the caller decides
    /// separately whether a short physical read is acceptable, the way the
    /// loader does for section bodies).
    pub fn deserialize(buffer: &InputBuffer, pos: u64, data_size: usize) -> Self {
        let mut physical = vec![0u8; data_size];
        let got = buffer.read(pos, &mut physical);
        physical.truncate(got);
        PackedByteVector {
            state: PackedState::capture(buffer, pos),
            data_size,
            physical,
        }
    }

    pub fn physical_size(&self) -> usize {
        self.physical.len()
    }

    pub fn physical_bytes(&self) -> &[u8] {
        &self.physical
    }

    /// The full logical content, zero-extended to `data_size`.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = self.physical.clone();
        out.resize(self.data_size, 0);
        out
    }

    pub fn serialize(&self, write_virtual_part: bool) -> Vec<u8> {
        if write_virtual_part {
            self.to_vec()
        } else {
            self.physical.clone()
        }
    }
}

/// A fixed-capacity packed byte array (`N` bytes of storage, `data_size` of
/// which may be logically meaningful — e.g. a section name field that is
/// NUL-padded but not NUL-terminated).
#[derive(Debug, Clone, Copy)]
pub struct PackedByteArray<const N: usize> {
    pub state: PackedState,
    pub physical_size: usize,
    bytes: [u8; N],
}

impl<const N: usize> PackedByteArray<N> {
    pub fn deserialize(buffer: &InputBuffer, pos: u64, allow_virtual: bool) -> Result<Self, crate::error::UtilError> {
        let mut bytes = [0u8; N];
        let got = buffer.read(pos, &mut bytes);
        if got < N && !allow_virtual {
            return Err(crate::error::UtilError::BufferOverrun {
                offset: pos as usize,
                len: N,
                size: buffer.size() as usize,
            });
        }
        Ok(PackedByteArray {
            state: PackedState::capture(buffer, pos),
            physical_size: got,
            bytes,
        })
    }

    pub fn bytes(&self) -> &[u8; N] {
        &self.bytes
    }
}
