//! The input-buffer tagged sum: every byte source this crate reads from,
//! unified behind one set of positional-read operations.

use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use crate::error::UtilError;

/// Shared handle to an input buffer. Every sub-structure that keeps a
/// reference into the source (rather than copying it) holds one of these;
/// cloning is cheap (it bumps a refcount), so referencing mode shares
/// ownership rather than duplicating bytes.
pub type InputBufferRef = Arc<InputBuffer>;

/// A polymorphic, possibly-virtual byte source.
#[derive(Debug)]
pub enum InputBuffer {
    /// A borrowed/owned contiguous byte range. The borrowed form is called
    /// "memory" and the owned form "container"; both behave identically
    /// once decoupled from how the bytes got there, so they share a
    /// representation (`Arc<[u8]>` is cheap to clone either way and
    /// keeps the buffer tree free of lifetime parameters, which is what
    /// lets a `Section`/`Virtual` wrapper be constructed without knowing
    /// how long its ancestors will live).
    Memory { data: Arc<[u8]> },
    Container { data: Arc<[u8]> },
    /// A seekable stream with a single shared, mutable cursor. Not
    /// stateless: concurrent reads from two threads would race on the
    /// cursor, so [`InputBuffer::is_stateless`] returns `false`.
    Stream {
        inner: Mutex<Box<dyn StreamSource>>,
        size: u64,
    },
    /// A window `[offset, offset+size)` over a parent buffer.
    Section {
        parent: InputBufferRef,
        offset: u64,
        size: u64,
        absolute_offset: u64,
        relative_offset: u64,
    },
    /// Extends `parent` by `extra` logical zero bytes.
    Virtual {
        parent: InputBufferRef,
        extra: u64,
    },
}

/// Object-safe seek+read source backing the `Stream` variant.
pub trait StreamSource: Read + Seek + Send + std::fmt::Debug {}
impl<T: Read + Seek + Send + std::fmt::Debug> StreamSource for T {}

impl InputBuffer {
    pub fn from_slice(data: impl Into<Arc<[u8]>>) -> InputBufferRef {
        Arc::new(InputBuffer::Memory { data: data.into() })
    }

    pub fn from_vec(data: Vec<u8>) -> InputBufferRef {
        Arc::new(InputBuffer::Container { data: data.into() })
    }

    pub fn from_stream(mut stream: impl StreamSource + 'static) -> std::io::Result<InputBufferRef> {
        let size = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;
        Ok(Arc::new(InputBuffer::Stream {
            inner: Mutex::new(Box::new(stream)),
            size,
        }))
    }

    /// Total logical byte count (physical + virtual).
    pub fn size(&self) -> u64 {
        match self {
            InputBuffer::Memory { data } | InputBuffer::Container { data } => data.len() as u64,
            InputBuffer::Stream { size, .. } => *size,
            InputBuffer::Section { size, .. } => *size,
            InputBuffer::Virtual { parent, extra } => parent.size() + extra,
        }
    }

    /// Bytes actually present in the underlying source.
    pub fn physical_size(&self) -> u64 {
        match self {
            InputBuffer::Memory { data } | InputBuffer::Container { data } => data.len() as u64,
            InputBuffer::Stream { size, .. } => *size,
            InputBuffer::Section {
                parent,
                offset,
                size,
                ..
            } => {
                let parent_phys = parent.physical_size();
                if *offset >= parent_phys {
                    0
                } else {
                    (parent_phys - offset).min(*size)
                }
            }
            InputBuffer::Virtual { parent, .. } => parent.physical_size(),
        }
    }

    pub fn virtual_size(&self) -> u64 {
        self.size() - self.physical_size()
    }

    /// Offset within the original underlying source. Invariant under
    /// wrapping: adding another `Section`/`Virtual` layer only adds through.
    pub fn absolute_offset(&self) -> u64 {
        match self {
            InputBuffer::Memory { .. } | InputBuffer::Container { .. } | InputBuffer::Stream { .. } => 0,
            InputBuffer::Section { absolute_offset, .. } => *absolute_offset,
            InputBuffer::Virtual { parent, .. } => parent.absolute_offset(),
        }
    }

    /// Offset within the immediately enclosing image coordinate system.
    /// Reset by constructing a `Section` with an explicit `relative_offset`
    /// (the loader does this when it crosses from file-offset space into
    /// RVA space at section data).
    pub fn relative_offset(&self) -> u64 {
        match self {
            InputBuffer::Memory { .. } | InputBuffer::Container { .. } | InputBuffer::Stream { .. } => 0,
            InputBuffer::Section { relative_offset, .. } => *relative_offset,
            InputBuffer::Virtual { parent, .. } => parent.relative_offset(),
        }
    }

    /// True when concurrent reads at different positions from multiple
    /// threads are safe.
    pub fn is_stateless(&self) -> bool {
        match self {
            InputBuffer::Memory { .. } | InputBuffer::Container { .. } => true,
            InputBuffer::Stream { .. } => false,
            InputBuffer::Section { parent, .. } => parent.is_stateless(),
            InputBuffer::Virtual { parent, .. } => parent.is_stateless(),
        }
    }

    /// Positional read. Returns the number of bytes actually written into
    /// `dst` (a short read is not an error; only callers that need an exact
    /// count treat a short read as a failure).
    pub fn read(&self, pos: u64, dst: &mut [u8]) -> usize {
        if pos >= self.size() {
            return 0;
        }
        let avail = (self.size() - pos).min(dst.len() as u64) as usize;
        let dst = &mut dst[..avail];
        match self {
            InputBuffer::Memory { data } | InputBuffer::Container { data } => {
                let pos = pos as usize;
                let n = avail.min(data.len().saturating_sub(pos));
                dst[..n].copy_from_slice(&data[pos..pos + n]);
                for b in &mut dst[n..] {
                    *b = 0;
                }
                avail
            }
            InputBuffer::Stream { inner, .. } => {
                let mut guard = inner.lock().expect("stream mutex poisoned");
                if guard.seek(SeekFrom::Start(pos)).is_err() {
                    return 0;
                }
                let mut total = 0;
                while total < dst.len() {
                    match guard.read(&mut dst[total..]) {
                        Ok(0) => break,
                        Ok(n) => total += n,
                        Err(_) => break,
                    }
                }
                total
            }
            InputBuffer::Section { parent, offset, .. } => parent.read(offset + pos, dst),
            InputBuffer::Virtual { parent, .. } => {
                let phys = parent.physical_size();
                if pos >= phys {
                    for b in dst.iter_mut() {
                        *b = 0;
                    }
                    avail
                } else {
                    let phys_avail = ((phys - pos) as usize).min(dst.len());
                    let n = parent.read(pos, &mut dst[..phys_avail]);
                    for b in &mut dst[n..] {
                        *b = 0;
                    }
                    avail
                }
            }
        }
    }

    /// A read that fails (rather than short-reading) unless the requested
    /// range is fully satisfiable; used by packed decoders when
    /// `allow_virtual = false`.
    pub fn read_exact(&self, pos: u64, dst: &mut [u8]) -> Result<(), UtilError> {
        if pos.checked_add(dst.len() as u64).is_none() || pos + (dst.len() as u64) > self.size() {
            return Err(UtilError::BufferOverrun {
                offset: pos as usize,
                len: dst.len(),
                size: self.size() as usize,
            });
        }
        let n = self.read(pos, dst);
        if n != dst.len() {
            return Err(UtilError::BufferOverrun {
                offset: pos as usize,
                len: dst.len(),
                size: self.size() as usize,
            });
        }
        Ok(())
    }

    /// A pointer into contiguous memory, when the source is contiguous and
    /// the requested range is entirely physical. Used by zero-copy
    /// ref-buffers and by `get_raw_data`-style fast paths.
    pub fn get_raw_data(&self, pos: u64, count: u64) -> Option<&[u8]> {
        match self {
            InputBuffer::Memory { data } | InputBuffer::Container { data } => {
                let end = pos.checked_add(count)?;
                if end > data.len() as u64 {
                    return None;
                }
                Some(&data[pos as usize..end as usize])
            }
            InputBuffer::Stream { .. } => None,
            InputBuffer::Section { parent, offset, size, .. } => {
                if pos.checked_add(count)? > *size {
                    return None;
                }
                parent.get_raw_data(offset + pos, count)
            }
            InputBuffer::Virtual { parent, .. } => {
                if pos.checked_add(count)? > parent.physical_size() {
                    return None;
                }
                parent.get_raw_data(pos, count)
            }
        }
    }

    /// Copies the full logical range into an owned vector, zero-extending
    /// any virtual tail.
    pub fn to_vec(&self) -> Vec<u8> {
        let size = self.size() as usize;
        let mut out = vec![0u8; size];
        self.read(0, &mut out);
        out
    }
}

/// `reduce(buffer, offset, size)` — construct a section, failing with
/// *buffer-overrun* if the requested range exceeds the source's logical
/// size (not `physical_size`, so virtual bytes remain addressable).
pub fn reduce(buffer: &InputBufferRef, offset: u64, size: u64) -> Result<InputBufferRef, UtilError> {
    let end = offset.checked_add(size).ok_or(UtilError::IntegerOverflow("reduce end"))?;
    if end > buffer.size() {
        return Err(UtilError::BufferOverrun {
            offset: offset as usize,
            len: size as usize,
            size: buffer.size() as usize,
        });
    }
    let absolute_offset = buffer.absolute_offset() + offset;
    let relative_offset = buffer.relative_offset() + offset;
    Ok(Arc::new(InputBuffer::Section {
        parent: buffer.clone(),
        offset,
        size,
        absolute_offset,
        relative_offset,
    }))
}

/// `reduce(buffer, offset)` — a section from `offset` to the end of `buffer`.
pub fn reduce_to_end(buffer: &InputBufferRef, offset: u64) -> Result<InputBufferRef, UtilError> {
    if offset > buffer.size() {
        return Err(UtilError::BufferOverrun {
            offset: offset as usize,
            len: 0,
            size: buffer.size() as usize,
        });
    }
    reduce(buffer, offset, buffer.size() - offset)
}

/// Wraps `buffer` so reads past its physical end produce `extra` zero bytes
/// instead of short-reading.
pub fn extend_virtual(buffer: InputBufferRef, extra: u64) -> InputBufferRef {
    if extra == 0 {
        return buffer;
    }
    Arc::new(InputBuffer::Virtual { parent: buffer, extra })
}

/// Re-bases the `relative_offset` coordinate system starting at `section`.
/// Only affects reads through the returned handle; the original `section`
/// (and anything already built from it) is untouched. Rebasing is a pure,
/// non-mutating operation that produces a new view, so nested sections
/// built from the *original* handle never observe a rebase performed on a
/// sibling view.
pub fn with_relative_offset(section: &InputBufferRef, relative_offset: u64) -> InputBufferRef {
    match section.as_ref() {
        InputBuffer::Section {
            parent,
            offset,
            size,
            absolute_offset,
            ..
        } => Arc::new(InputBuffer::Section {
            parent: parent.clone(),
            offset: *offset,
            size: *size,
            absolute_offset: *absolute_offset,
            relative_offset,
        }),
        _ => Arc::new(InputBuffer::Section {
            parent: section.clone(),
            offset: 0,
            size: section.size(),
            absolute_offset: section.absolute_offset(),
            relative_offset,
        }),
    }
}
