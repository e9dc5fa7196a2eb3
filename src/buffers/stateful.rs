//! The stateful wrapper: pairs an [`InputBuffer`] with a read cursor
//! (`rpos`) so a single stateless source can back many independent readers.

use std::cell::Cell;

use super::input::InputBufferRef;

#[derive(Debug)]
pub struct StatefulInputBuffer {
    buffer: InputBufferRef,
    rpos: Cell<u64>,
}

impl StatefulInputBuffer {
    pub fn new(buffer: InputBufferRef) -> Self {
        StatefulInputBuffer {
            buffer,
            rpos: Cell::new(0),
        }
    }

    pub fn buffer(&self) -> &InputBufferRef {
        &self.buffer
    }

    pub fn rpos(&self) -> u64 {
        self.rpos.get()
    }

    pub fn set_rpos(&self, pos: u64) {
        self.rpos.set(pos);
    }

    pub fn advance_rpos(&self, offset: i64) {
        let cur = self.rpos.get() as i64;
        self.rpos.set((cur + offset).max(0) as u64);
    }

    /// Reads `dst.len()` bytes starting at the cursor, advancing it by the
    /// number of bytes actually produced.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        let n = self.buffer.read(self.rpos.get(), dst);
        self.rpos.set(self.rpos.get() + n as u64);
        n
    }
}
