//! Stream transport capabilities.
//!
//! The request pipeline never touches frames, header compression or flow
//! control directly. It only needs a small set of per-stream operations:
//!
//! - read the request header set
//! - read request body bytes until the end-of-stream marker
//! - write the response header set and body bytes, flagging the last write
//! - cancel the stream when something goes wrong
//!
//! These are expressed as traits so handlers and the copier can run over
//! the HTTP/2 adapter in [`http2`] or over an in-memory stream in tests.

use async_trait::async_trait;
use std::borrow::Cow;
use thiserror::Error;

pub mod http2;

#[cfg(test)]
pub mod mock;

/// A single header (name, value) pair. Sets of headers are ordered and may
/// carry duplicate names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Cow<'static, str>,
    pub value: Cow<'static, str>,
}

impl HeaderField {
    /// Build a header from static strings, usable in `static` items.
    pub const fn from_static(name: &'static str, value: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            value: Cow::Borrowed(value),
        }
    }

    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            value: Cow::Owned(value.into()),
        }
    }
}

/// Outcome of one body read.
///
/// `end_of_stream` may be set together with a non-zero `bytes_read`; the
/// bytes must be consumed before treating the stream as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResult {
    pub bytes_read: usize,
    pub end_of_stream: bool,
}

impl ReadResult {
    #[cfg(test)]
    pub fn data(bytes_read: usize) -> Self {
        Self {
            bytes_read,
            end_of_stream: false,
        }
    }

    pub fn last(bytes_read: usize) -> Self {
        Self {
            bytes_read,
            end_of_stream: true,
        }
    }

    pub fn end() -> Self {
        Self::last(0)
    }
}

/// Failures surfaced by stream operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http/2 error: {0}")]
    Http2(#[from] h2::Error),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("response headers already sent")]
    HeadersAlreadySent,
    #[error("response headers not sent yet")]
    HeadersNotSent,
    #[error("write after end of stream")]
    WriteAfterEnd,
    #[error("stream closed by peer")]
    StreamClosed,
}

/// Readable half of a stream body.
#[async_trait]
pub trait ReadableByteStream: Send {
    /// Read up to `buf.len()` bytes. Suspends until data or end-of-stream.
    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadResult, TransportError>;
}

/// Writeable half of a stream body.
#[async_trait]
pub trait WriteableByteStream: Send {
    /// Write all of `data`, flagging end-of-stream on the last frame when
    /// `end_of_stream` is set. Suspends until the transport accepts the bytes.
    async fn write(&mut self, data: &[u8], end_of_stream: bool) -> Result<(), TransportError>;
}

/// One inbound request/response exchange.
#[async_trait]
pub trait ServerStream: Send + 'static {
    type Reader: ReadableByteStream;
    type Writer: WriteableByteStream;

    /// Request header set, pseudo-headers first.
    async fn read_headers(&mut self) -> Result<Vec<HeaderField>, TransportError>;

    /// Send the response header set. `end_of_stream` means no body follows.
    async fn write_headers(
        &mut self,
        fields: &[HeaderField],
        end_of_stream: bool,
    ) -> Result<(), TransportError>;

    /// Borrow both body halves at once so one can be copied into the other.
    fn body(&mut self) -> (&mut Self::Reader, &mut Self::Writer);

    /// Tear the stream down. Never suspends.
    fn cancel(&mut self);

    fn reader(&mut self) -> &mut Self::Reader {
        self.body().0
    }

    fn writer(&mut self) -> &mut Self::Writer {
        self.body().1
    }
}

/// Callback invoked by a connection for every stream the peer opens.
///
/// Must return quickly. Returning `false` refuses the stream.
pub trait StreamListener<S>: Send + Sync + 'static {
    fn on_stream(&self, stream: S) -> bool;
}
