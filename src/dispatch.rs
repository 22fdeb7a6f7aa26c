//! Per-stream dispatch.
//!
//! The dispatcher is the stream listener attached to every connection.
//! It is called synchronously by the transport for each inbound stream and
//! must return right away, so it only spawns a task running one handler
//! and reports the stream as accepted. Nothing joins that task: a failing
//! stream cancels itself and never reaches the connection or its siblings.

use crate::config::ResponseMode;
use crate::handlers::{self, StreamOutcome};
use crate::runtime::BufferPool;
use crate::transport::{ServerStream, StreamListener};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::Instrument;

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    active: AtomicUsize,
}

/// Point-in-time view of dispatcher activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub accepted: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub active: usize,
}

/// Keeps `active` accurate even if a handler task panics.
struct ActiveStream(Arc<Counters>);

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Launches one handler task per inbound stream.
pub struct StreamDispatcher {
    mode: ResponseMode,
    pool: Arc<BufferPool>,
    counters: Arc<Counters>,
}

impl StreamDispatcher {
    pub fn new(mode: ResponseMode, pool: Arc<BufferPool>) -> Self {
        Self {
            mode,
            pool,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            active: self.counters.active.load(Ordering::Acquire),
        }
    }
}

impl<S: ServerStream> StreamListener<S> for StreamDispatcher {
    fn on_stream(&self, stream: S) -> bool {
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        self.counters.active.fetch_add(1, Ordering::AcqRel);

        let active = ActiveStream(Arc::clone(&self.counters));
        let pool = Arc::clone(&self.pool);
        let mode = self.mode;

        tokio::spawn(
            async move {
                let outcome = handlers::serve(mode, stream, &pool).await;
                let counter = match outcome {
                    StreamOutcome::Completed => &active.0.completed,
                    StreamOutcome::Cancelled => &active.0.cancelled,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            .in_current_span(),
        );

        true
    }
}
