//! Stream handlers.
//!
//! A handler owns one inbound stream for the length of one exchange:
//! it reads the request headers, consumes the request body, and writes a
//! `200` response whose final write carries end-of-stream.
//!
//! ## Handlers
//! - `echo`: the response body is the request body
//! - `drain`: the request body is discarded and `Hello World!` is returned
//!
//! Any failure along the way is reported once, here, and the stream is
//! cancelled. Nothing is retried and no partial response is attempted.

pub mod drain;
pub mod echo;

use crate::config::ResponseMode;
use crate::runtime::BufferPool;
use crate::transport::{HeaderField, ServerStream};
use tracing::{trace, warn};

/// Response header set shared by both handlers.
pub static RESPONSE_HEADERS: [HeaderField; 2] = [
    HeaderField::from_static(":status", "200"),
    HeaderField::from_static("nextone", "i am a header value"),
];

/// Fixed payload sent by the drain handler.
pub const RESPONSE_BODY: &[u8] = b"Hello World!";

/// How a stream's exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
}

/// Run the handler for `mode` on `stream` to completion.
pub async fn serve<S: ServerStream>(
    mode: ResponseMode,
    mut stream: S,
    pool: &BufferPool,
) -> StreamOutcome {
    let result = match mode {
        ResponseMode::Echo => echo::handle(&mut stream, pool).await,
        ResponseMode::Drain => drain::handle(&mut stream, pool).await,
    };

    match result {
        Ok(()) => {
            trace!(?mode, "Stream completed");
            StreamOutcome::Completed
        }
        Err(e) => {
            warn!(?mode, error = %e, "Error during handling request");
            stream.cancel();
            StreamOutcome::Cancelled
        }
    }
}
