//! The output-buffer tagged sum. Dual of [`crate::buffers::input::InputBuffer`]
//! but exclusive rather than shared: there is exactly one writer.

use std::io::{Seek, SeekFrom, Write};

/// A polymorphic byte sink with a stateful write cursor (`wpos`).
pub enum OutputBuffer<'a> {
    /// Writes into a caller-provided, fixed-size slice. A write past the
    /// end short-writes rather than panicking.
    Memory { data: &'a mut [u8], wpos: usize },
    /// An appending vector; `wpos` may be anywhere, including mid-vector
    /// (used when the builder back-patches a field), and writes past the
    /// current end grow the vector.
    Vector { data: Vec<u8>, wpos: usize },
    /// A seekable stream sink.
    Stream { inner: Box<dyn StreamSink>, wpos: u64 },
}

pub trait StreamSink: Write + Seek {}
impl<T: Write + Seek> StreamSink for T {}

impl<'a> OutputBuffer<'a> {
    pub fn on_slice(data: &'a mut [u8]) -> Self {
        OutputBuffer::Memory { data, wpos: 0 }
    }

    pub fn new_vector() -> Self {
        OutputBuffer::Vector {
            data: Vec::new(),
            wpos: 0,
        }
    }

    pub fn on_stream(stream: impl StreamSink + 'static) -> Self {
        OutputBuffer::Stream {
            inner: Box::new(stream),
            wpos: 0,
        }
    }

    pub fn wpos(&self) -> u64 {
        match self {
            OutputBuffer::Memory { wpos, .. } => *wpos as u64,
            OutputBuffer::Vector { wpos, .. } => *wpos as u64,
            OutputBuffer::Stream { wpos, .. } => *wpos,
        }
    }

    pub fn set_wpos(&mut self, pos: u64) {
        match self {
            OutputBuffer::Memory { wpos, .. } => *wpos = pos as usize,
            OutputBuffer::Vector { wpos, .. } => *wpos = pos as usize,
            OutputBuffer::Stream { wpos, .. } => *wpos = pos,
        }
    }

    pub fn advance_wpos(&mut self, offset: i64) {
        let new_pos = (self.wpos() as i64 + offset).max(0) as u64;
        self.set_wpos(new_pos);
    }

    /// Writes `src` at the current `wpos`, advancing it. Returns the number
    /// of bytes actually written (short for `Memory` past its bound).
    pub fn write(&mut self, src: &[u8]) -> usize {
        match self {
            OutputBuffer::Memory { data, wpos } => {
                if *wpos >= data.len() {
                    return 0;
                }
                let n = src.len().min(data.len() - *wpos);
                data[*wpos..*wpos + n].copy_from_slice(&src[..n]);
                *wpos += n;
                n
            }
            OutputBuffer::Vector { data, wpos } => {
                let end = *wpos + src.len();
                if end > data.len() {
                    data.resize(end, 0);
                }
                data[*wpos..end].copy_from_slice(src);
                *wpos = end;
                src.len()
            }
            OutputBuffer::Stream { inner, wpos } => {
                if inner.seek(SeekFrom::Start(*wpos)).is_err() {
                    return 0;
                }
                match inner.write(src) {
                    Ok(n) => {
                        *wpos += n as u64;
                        n
                    }
                    Err(_) => 0,
                }
            }
        }
    }

    pub fn into_vec(self) -> Option<Vec<u8>> {
        match self {
            OutputBuffer::Vector { data, .. } => Some(data),
            _ => None,
        }
    }
}
