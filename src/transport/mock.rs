//! In-memory stream transport for tests.
//!
//! Reads are scripted as `(bytes, end_of_stream)` chunks; writes, response
//! headers and cancellation are recorded in a shared [`Exchange`] so tests
//! can inspect them after the stream has moved into a task.

use super::{
    HeaderField, ReadResult, ReadableByteStream, ServerStream, TransportError,
    WriteableByteStream,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

fn injected() -> TransportError {
    TransportError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "injected failure"))
}

/// Scripted request body.
#[derive(Default)]
pub struct MockReader {
    chunks: VecDeque<(Vec<u8>, bool)>,
    offset: usize,
    reads: usize,
    fail_at: Option<usize>,
}

impl MockReader {
    pub fn from_chunks(chunks: impl IntoIterator<Item = (Vec<u8>, bool)>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Fail the `n`th read (zero based).
    pub fn fail_read_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn is_exhausted(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl ReadableByteStream for MockReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadResult, TransportError> {
        let index = self.reads;
        self.reads += 1;
        tokio::task::yield_now().await;

        if self.fail_at == Some(index) {
            return Err(injected());
        }

        let Some((data, end)) = self.chunks.front() else {
            return Ok(ReadResult::end());
        };

        let n = (data.len() - self.offset).min(buf.len());
        buf[..n].copy_from_slice(&data[self.offset..self.offset + n]);
        self.offset += n;

        if self.offset < data.len() {
            return Ok(ReadResult::data(n));
        }

        let end = *end;
        self.chunks.pop_front();
        self.offset = 0;
        Ok(ReadResult {
            bytes_read: n,
            end_of_stream: end,
        })
    }
}

/// Everything the server side sent on a mock stream.
#[derive(Debug, Default)]
pub struct Exchange {
    pub response_headers: Option<(Vec<HeaderField>, bool)>,
    pub writes: Vec<(Vec<u8>, bool)>,
    pub cancelled: bool,
}

impl Exchange {
    pub fn body(&self) -> Vec<u8> {
        self.writes.iter().flat_map(|(chunk, _)| chunk.iter().copied()).collect()
    }

    pub fn end_of_stream_writes(&self) -> usize {
        self.writes.iter().filter(|(_, end)| *end).count()
    }

    pub fn status(&self) -> Option<String> {
        let (fields, _) = self.response_headers.as_ref()?;
        fields
            .iter()
            .find(|f| f.name == ":status")
            .map(|f| f.value.to_string())
    }

    /// True once the response side saw exactly one end-of-stream.
    pub fn is_complete(&self) -> bool {
        let headers_closed = matches!(self.response_headers, Some((_, true)));
        usize::from(headers_closed) + self.end_of_stream_writes() == 1
    }
}

pub type ExchangeLog = Arc<Mutex<Exchange>>;

/// Recording response body writer.
#[derive(Default)]
pub struct MockWriter {
    log: ExchangeLog,
    writes: usize,
    fail_at: Option<usize>,
    closed: bool,
}

impl MockWriter {
    /// Fail the `n`th write (zero based).
    pub fn fail_write_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    pub fn data(&self) -> Vec<u8> {
        self.log.lock().body()
    }

    pub fn writes(&self) -> Vec<(Vec<u8>, bool)> {
        self.log.lock().writes.clone()
    }

    pub fn end_of_stream_writes(&self) -> usize {
        self.log.lock().end_of_stream_writes()
    }
}

#[async_trait]
impl WriteableByteStream for MockWriter {
    async fn write(&mut self, data: &[u8], end_of_stream: bool) -> Result<(), TransportError> {
        let index = self.writes;
        self.writes += 1;
        tokio::task::yield_now().await;

        if self.fail_at == Some(index) {
            return Err(injected());
        }
        if self.closed {
            return Err(TransportError::WriteAfterEnd);
        }

        self.closed = end_of_stream;
        self.log.lock().writes.push((data.to_vec(), end_of_stream));
        Ok(())
    }
}

/// A whole request/response exchange held in memory.
pub struct MockStream {
    request_headers: Vec<HeaderField>,
    reader: MockReader,
    writer: MockWriter,
    fail_headers: bool,
}

impl MockStream {
    pub fn new(body: impl IntoIterator<Item = (Vec<u8>, bool)>) -> Self {
        Self {
            request_headers: vec![
                HeaderField::from_static(":method", "POST"),
                HeaderField::from_static(":path", "/"),
            ],
            reader: MockReader::from_chunks(body),
            writer: MockWriter::default(),
            fail_headers: false,
        }
    }

    pub fn fail_read_at(mut self, n: usize) -> Self {
        self.reader = self.reader.fail_read_at(n);
        self
    }

    pub fn fail_write_at(mut self, n: usize) -> Self {
        self.writer = self.writer.fail_write_at(n);
        self
    }

    pub fn fail_headers(mut self) -> Self {
        self.fail_headers = true;
        self
    }

    /// Handle for inspecting the exchange after the stream is moved.
    pub fn log(&self) -> ExchangeLog {
        Arc::clone(&self.writer.log)
    }
}

#[async_trait]
impl ServerStream for MockStream {
    type Reader = MockReader;
    type Writer = MockWriter;

    async fn read_headers(&mut self) -> Result<Vec<HeaderField>, TransportError> {
        tokio::task::yield_now().await;
        if self.fail_headers {
            return Err(injected());
        }
        Ok(self.request_headers.clone())
    }

    async fn write_headers(
        &mut self,
        fields: &[HeaderField],
        end_of_stream: bool,
    ) -> Result<(), TransportError> {
        let mut log = self.writer.log.lock();
        if log.response_headers.is_some() {
            return Err(TransportError::HeadersAlreadySent);
        }
        log.response_headers = Some((fields.to_vec(), end_of_stream));
        self.writer.closed = end_of_stream;
        Ok(())
    }

    fn body(&mut self) -> (&mut MockReader, &mut MockWriter) {
        (&mut self.reader, &mut self.writer)
    }

    fn cancel(&mut self) {
        self.writer.log.lock().cancelled = true;
    }
}
