//! HTTP/2 adapter over the `h2` crate.
//!
//! Each accepted `h2` stream becomes an [`H2Stream`]: the request head is
//! flattened into [`HeaderField`]s, the request body is read through a
//! flow-controlled [`H2Reader`], and the response is written through an
//! [`H2Writer`] that waits for send capacity instead of buffering without
//! bound.

use super::{
    HeaderField, ReadResult, ReadableByteStream, ServerStream, StreamListener, TransportError,
    WriteableByteStream,
};
use crate::config::Http2Config;
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use h2::server::{self, SendResponse};
use h2::{Reason, RecvStream, SendStream, StreamId};
use http::header::{HeaderName, HeaderValue};
use http::{request, Request, Response, StatusCode};
use std::future::poll_fn;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

/// Drive one HTTP/2 server connection until the peer goes away.
///
/// Every inbound stream is handed to `listener`; the connection keeps
/// accepting while the listener's tasks run.
pub async fn serve_connection<T, L>(
    io: T,
    settings: &Http2Config,
    listener: Arc<L>,
) -> Result<(), TransportError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    L: StreamListener<H2Stream>,
{
    let mut builder = server::Builder::new();
    if let Some(n) = settings.max_concurrent_streams {
        builder.max_concurrent_streams(n);
    }
    if let Some(n) = settings.initial_window_size {
        builder.initial_window_size(n);
    }

    let mut connection = builder.handshake::<_, Bytes>(io).await?;
    trace!("HTTP/2 handshake complete");

    while let Some(accepted) = connection.accept().await {
        let (request, respond) = accepted?;
        let stream = H2Stream::new(request, respond);
        let stream_id = stream.stream_id();

        // A refused stream is dropped here, and h2 resets it.
        if !listener.on_stream(stream) {
            debug!(?stream_id, "Stream refused");
        }
    }

    Ok(())
}

/// One request/response exchange on an HTTP/2 connection.
pub struct H2Stream {
    stream_id: StreamId,
    head: Vec<HeaderField>,
    reader: H2Reader,
    writer: H2Writer,
}

impl H2Stream {
    pub fn new(request: Request<RecvStream>, respond: SendResponse<Bytes>) -> Self {
        let (parts, recv) = request.into_parts();
        Self {
            stream_id: respond.stream_id(),
            head: request_headers(&parts),
            reader: H2Reader {
                recv,
                pending: Bytes::new(),
            },
            writer: H2Writer {
                respond,
                state: ResponseState::Pending,
            },
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }
}

#[async_trait]
impl ServerStream for H2Stream {
    type Reader = H2Reader;
    type Writer = H2Writer;

    async fn read_headers(&mut self) -> Result<Vec<HeaderField>, TransportError> {
        // h2 delivers the request head together with the stream.
        Ok(self.head.clone())
    }

    async fn write_headers(
        &mut self,
        fields: &[HeaderField],
        end_of_stream: bool,
    ) -> Result<(), TransportError> {
        self.writer.send_headers(fields, end_of_stream)
    }

    fn body(&mut self) -> (&mut H2Reader, &mut H2Writer) {
        (&mut self.reader, &mut self.writer)
    }

    fn cancel(&mut self) {
        self.writer.reset(Reason::CANCEL);
    }
}

/// Request body reader.
///
/// Holds at most one received DATA chunk; capacity is released back to the
/// peer as bytes are handed to the caller.
pub struct H2Reader {
    recv: RecvStream,
    pending: Bytes,
}

#[async_trait]
impl ReadableByteStream for H2Reader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadResult, TransportError> {
        while self.pending.is_empty() {
            if self.recv.is_end_stream() {
                return Ok(ReadResult::end());
            }
            match self.recv.data().await {
                Some(Ok(chunk)) => self.pending = chunk,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(ReadResult::end()),
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        if n > 0 {
            self.recv.flow_control().release_capacity(n)?;
        }

        Ok(ReadResult {
            bytes_read: n,
            end_of_stream: self.pending.is_empty() && self.recv.is_end_stream(),
        })
    }
}

enum ResponseState {
    Pending,
    Streaming(SendStream<Bytes>),
    Closed,
}

/// Response writer.
pub struct H2Writer {
    respond: SendResponse<Bytes>,
    state: ResponseState,
}

impl H2Writer {
    fn send_headers(
        &mut self,
        fields: &[HeaderField],
        end_of_stream: bool,
    ) -> Result<(), TransportError> {
        if !matches!(self.state, ResponseState::Pending) {
            return Err(TransportError::HeadersAlreadySent);
        }

        let response = response_from_fields(fields)?;
        let send = self.respond.send_response(response, end_of_stream)?;
        self.state = if end_of_stream {
            ResponseState::Closed
        } else {
            ResponseState::Streaming(send)
        };
        Ok(())
    }

    fn reset(&mut self, reason: Reason) {
        match &mut self.state {
            ResponseState::Streaming(send) => send.send_reset(reason),
            ResponseState::Pending => self.respond.send_reset(reason),
            ResponseState::Closed => {}
        }
        self.state = ResponseState::Closed;
    }
}

#[async_trait]
impl WriteableByteStream for H2Writer {
    async fn write(&mut self, data: &[u8], end_of_stream: bool) -> Result<(), TransportError> {
        let send = match &mut self.state {
            ResponseState::Streaming(send) => send,
            ResponseState::Pending => return Err(TransportError::HeadersNotSent),
            ResponseState::Closed => return Err(TransportError::WriteAfterEnd),
        };

        let mut remaining = data;
        while !remaining.is_empty() {
            send.reserve_capacity(remaining.len());
            let granted = match poll_fn(|cx| send.poll_capacity(cx)).await {
                Some(granted) => granted?,
                None => return Err(TransportError::StreamClosed),
            };
            if granted == 0 {
                continue;
            }

            let (chunk, rest) = remaining.split_at(granted.min(remaining.len()));
            send.send_data(
                Bytes::copy_from_slice(chunk),
                end_of_stream && rest.is_empty(),
            )?;
            remaining = rest;
        }

        if data.is_empty() && end_of_stream {
            send.send_data(Bytes::new(), true)?;
        }
        if end_of_stream {
            self.state = ResponseState::Closed;
        }
        Ok(())
    }
}

/// Flatten a request head into header fields, pseudo-headers first.
fn request_headers(parts: &request::Parts) -> Vec<HeaderField> {
    let mut fields = Vec::with_capacity(parts.headers.len() + 4);
    fields.push(HeaderField::new(":method", parts.method.as_str()));
    if let Some(scheme) = parts.uri.scheme_str() {
        fields.push(HeaderField::new(":scheme", scheme));
    }
    if let Some(authority) = parts.uri.authority() {
        fields.push(HeaderField::new(":authority", authority.as_str()));
    }
    if let Some(path) = parts.uri.path_and_query() {
        fields.push(HeaderField::new(":path", path.as_str()));
    }
    for (name, value) in parts.headers.iter() {
        fields.push(HeaderField::new(
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes()),
        ));
    }
    fields
}

/// Build a response head. `:status` is required; other pseudo-headers are
/// rejected.
fn response_from_fields(fields: &[HeaderField]) -> Result<Response<()>, TransportError> {
    let mut response = Response::new(());
    let mut status = None;

    for field in fields {
        if field.name == ":status" {
            let code = field
                .value
                .parse::<u16>()
                .ok()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or_else(|| {
                    TransportError::InvalidHeader(format!("bad :status '{}'", field.value))
                })?;
            status = Some(code);
            continue;
        }
        if field.name.starts_with(':') {
            return Err(TransportError::InvalidHeader(format!(
                "unexpected pseudo-header '{}'",
                field.name
            )));
        }

        let name = HeaderName::from_bytes(field.name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(format!("bad name '{}'", field.name)))?;
        let value = HeaderValue::from_str(&field.value).map_err(|_| {
            TransportError::InvalidHeader(format!("bad value for '{}'", field.name))
        })?;
        response.headers_mut().append(name, value);
    }

    *response.status_mut() = status
        .ok_or_else(|| TransportError::InvalidHeader("missing :status".to_string()))?;
    Ok(response)
}
