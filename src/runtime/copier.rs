//! Bounded-memory body movement.
//!
//! `drain` and `copy` each rent one buffer from the shared pool for the
//! whole call and loop read-by-read, so a body of any length never holds
//! more than one buffer of data in flight. The buffer is a
//! [`RentedBuffer`](super::buffer::RentedBuffer) guard and goes back to the pool
//! whether the loop finishes, fails, or the future is dropped.

use super::BufferPool;
use crate::transport::{ReadableByteStream, TransportError, WriteableByteStream};
use tracing::trace;

/// Buffer size requested by `copy`.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Buffer size requested by `drain`.
pub const DRAIN_BUFFER_SIZE: usize = 8 * 1024;

/// Summary of a finished `copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Bytes read from the source and written to the destination.
    pub bytes: u64,
    /// Whether the destination has already received its end-of-stream write.
    pub end_of_stream_sent: bool,
}

/// Read `source` to end-of-stream, discarding everything.
///
/// Returns the number of bytes discarded.
pub async fn drain<R>(source: &mut R, pool: &BufferPool) -> Result<u64, TransportError>
where
    R: ReadableByteStream + ?Sized,
{
    let mut buf = pool.rent(DRAIN_BUFFER_SIZE);
    let mut total = 0u64;

    loop {
        let res = source.read(&mut buf[..]).await?;
        total += res.bytes_read as u64;

        if res.end_of_stream {
            trace!(bytes = total, "Drained body");
            return Ok(total);
        }
    }
}

/// Forward `source` into `dest` until the source reaches end-of-stream.
///
/// Each read is written out before the next read starts. With
/// `forward_end_of_stream`, the write carrying the source's last bytes is
/// flagged end-of-stream; a final read with no bytes produces no write, and
/// the returned [`CopyOutcome`] tells the caller it still has to close
/// `dest`.
pub async fn copy<R, W>(
    source: &mut R,
    dest: &mut W,
    pool: &BufferPool,
    forward_end_of_stream: bool,
) -> Result<CopyOutcome, TransportError>
where
    R: ReadableByteStream + ?Sized,
    W: WriteableByteStream + ?Sized,
{
    let mut buf = pool.rent(COPY_BUFFER_SIZE);
    let mut outcome = CopyOutcome {
        bytes: 0,
        end_of_stream_sent: false,
    };

    loop {
        let res = source.read(&mut buf[..]).await?;

        if res.bytes_read != 0 {
            let close = forward_end_of_stream && res.end_of_stream;
            dest.write(&buf[..res.bytes_read], close).await?;
            outcome.bytes += res.bytes_read as u64;
            outcome.end_of_stream_sent = close;
        }

        if res.end_of_stream {
            trace!(bytes = outcome.bytes, "Copied body");
            return Ok(outcome);
        }
    }
}
