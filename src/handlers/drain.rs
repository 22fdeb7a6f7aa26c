//! Drain-and-respond handler.

use crate::handlers::{RESPONSE_BODY, RESPONSE_HEADERS};
use crate::runtime::{drain, BufferPool};
use crate::transport::{ServerStream, TransportError, WriteableByteStream};
use tracing::trace;

/// Discard the request body, then send the fixed response in one write.
pub async fn handle<S: ServerStream>(
    stream: &mut S,
    pool: &BufferPool,
) -> Result<(), TransportError> {
    let headers = stream.read_headers().await?;
    trace!(headers = headers.len(), "Drain request");

    let discarded = drain(stream.reader(), pool).await?;

    stream.write_headers(&RESPONSE_HEADERS, false).await?;
    stream.writer().write(RESPONSE_BODY, true).await?;

    trace!(bytes = discarded, "Drain complete");
    Ok(())
}
