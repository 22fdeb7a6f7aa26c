//! Streaming I/O primitives shared by every handler.
//!
//! - `BufferPool`: shared, lock-protected pool of fixed-size buffers
//! - `drain` / `copy`: bounded-memory body movement over any
//!   [`ReadableByteStream`](crate::transport::ReadableByteStream)

mod buffer;
mod copier;

pub use buffer::BufferPool;
pub use copier::{copy, drain};
