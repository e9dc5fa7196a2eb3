//! L1: the buffer layer.
//!
//! Every byte source a parser might read from — an in-memory slice, an
//! owned vector, a seekable stream, a window into another buffer, a
//! virtual zero-filled tail — is modeled as a tagged sum rather than a
//! class hierarchy, so the rest of the crate can hold one buffer handle
//! type regardless of what is ultimately backing it.

pub mod copy;
pub mod input;
pub mod output;
pub mod stateful;

pub use input::InputBuffer;
pub use output::OutputBuffer;
pub use stateful::StatefulInputBuffer;
