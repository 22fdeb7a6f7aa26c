//! Echo handler.
//!
//! Streams the request body straight back as the response body, one pooled
//! buffer at a time.

use crate::handlers::RESPONSE_HEADERS;
use crate::runtime::{copy, BufferPool};
use crate::transport::{ServerStream, TransportError, WriteableByteStream};
use tracing::trace;

/// Echo one stream. Errors are left to the caller, which cancels the stream.
pub async fn handle<S: ServerStream>(
    stream: &mut S,
    pool: &BufferPool,
) -> Result<(), TransportError> {
    let headers = stream.read_headers().await?;
    trace!(headers = headers.len(), "Echo request");

    stream.write_headers(&RESPONSE_HEADERS, false).await?;

    let (reader, writer) = stream.body();
    let outcome = copy(reader, writer, pool, true).await?;

    // Close the response unless the last copied chunk already did.
    if !outcome.end_of_stream_sent {
        writer.write(&[], true).await?;
    }

    trace!(bytes = outcome.bytes, "Echo complete");
    Ok(())
}
