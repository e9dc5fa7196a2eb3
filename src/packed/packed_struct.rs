//! A fixed-layout little-endian record plus the `state`/`physical_size`
//! metadata callers use to tell a fully-physical read apart from one that
//! ran past the end of the source. `scroll`'s derive macros decode the
//! bytes once they are in hand; this module owns the short-read /
//! zero-fill-the-tail contract scroll itself has no notion of.

use crate::buffers::InputBuffer;
use crate::error::UtilError;

use super::state::PackedState;

/// Implemented (usually via a thin `scroll::Pread`/`Pwrite` shim) by every
/// fixed-layout C record this crate decodes.
pub trait FixedLayout: Sized + Default + Copy {
    const SIZE: usize;
    fn read_le(buf: &[u8]) -> Self;
    fn write_le(&self, buf: &mut [u8]);
}

#[derive(Debug, Clone, Copy)]
pub struct PackedStruct<T> {
    pub value: T,
    pub state: PackedState,
    /// How many of `T::SIZE` bytes were physically present; the remainder
    /// (if any) was zero-filled because `allow_virtual` was set.
    pub physical_size: usize,
}

impl<T: FixedLayout> PackedStruct<T> {
    /// Deserializes `T` at `pos`. If fewer than `T::SIZE` physical bytes
    /// remain and `allow_virtual` is false, fails with *buffer-overrun*.
    /// If `allow_virtual` is true, the missing tail is zero-filled and
    /// `physical_size` records the true count.
    pub fn deserialize(buffer: &InputBuffer, pos: u64, allow_virtual: bool) -> Result<Self, UtilError> {
        let mut raw = vec![0u8; T::SIZE];
        let got = buffer.read(pos, &mut raw);
        if got < T::SIZE && !allow_virtual {
            return Err(UtilError::BufferOverrun {
                offset: pos as usize,
                len: T::SIZE,
                size: buffer.size() as usize,
            });
        }
        Ok(PackedStruct {
            value: T::read_le(&raw),
            state: PackedState::capture(buffer, pos),
            physical_size: got,
        })
    }

    /// Serializes `self.value`. When `write_virtual_part` is false, only
    /// the bytes that were physically present at deserialization time are
    /// emitted (used when rebuilding a header region byte-for-byte from the
    /// retained source rather than from re-encoded fields).
    pub fn serialize(&self, write_virtual_part: bool) -> Vec<u8> {
        let mut raw = vec![0u8; T::SIZE];
        self.value.write_le(&mut raw);
        if write_virtual_part {
            raw
        } else {
            raw.truncate(self.physical_size);
            raw
        }
    }

    pub fn is_fully_physical(&self) -> bool {
        self.physical_size == T::SIZE
    }
}

/// Implements [`FixedLayout`] for a type that already derives
/// `scroll::Pread`/`Pwrite`/`SizeWith` with a fixed little-endian layout.
macro_rules! impl_fixed_layout_via_scroll {
    ($ty:ty, $size:expr) => {
        impl $crate::packed::packed_struct::FixedLayout for $ty {
            const SIZE: usize = $size;

            fn read_le(buf: &[u8]) -> Self {
                use scroll::Pread;
                buf.pread_with::<$ty>(0, scroll::LE)
                    .expect("buffer padded to SIZE by PackedStruct::deserialize")
            }

            fn write_le(&self, buf: &mut [u8]) {
                use scroll::Pwrite;
                buf.pwrite_with::<$ty>(*self, 0, scroll::LE)
                    .expect("buffer sized to SIZE by PackedStruct::serialize");
            }
        }
    };
}

pub(crate) use impl_fixed_layout_via_scroll;
