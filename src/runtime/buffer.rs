//! Shared buffer pool management.
//!
//! Provides fixed-size buffer reuse without per-operation malloc overhead.
//! One pool is shared by every in-flight stream, so the free list sits
//! behind a lock and the counters are atomic.
//!
//! ## Rentals
//!
//! [`BufferPool::rent`] hands out a [`RentedBuffer`] guard. The guard gives
//! the buffer back when it is dropped, so a buffer is returned exactly once
//! on every exit path (completion, error, or a cancelled future).
//!
//! Requests larger than the pool's buffer size are served by a plain
//! allocation that is freed on return instead of being retained.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Buffer pool with fixed-size buffers shared across tasks.
///
/// Idle buffers are kept on a free list (LIFO for cache locality) up to
/// `max_retained`; beyond that, returned buffers are simply freed.
pub struct BufferPool {
    /// Idle buffers ready for reuse.
    free_list: Mutex<Vec<Box<[u8]>>>,
    /// Size of each pooled buffer.
    buffer_size: usize,
    /// Maximum number of idle buffers to keep.
    max_retained: usize,
    /// Buffers currently rented out.
    outstanding: AtomicUsize,
    /// Buffers allocated over the pool's lifetime.
    allocated: AtomicUsize,
}

/// Point-in-time view of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub buffer_size: usize,
    pub retained: usize,
    pub outstanding: usize,
    pub allocated: usize,
}

impl BufferPool {
    /// Create a new, empty buffer pool.
    ///
    /// # Arguments
    /// * `size` - Size of each pooled buffer in bytes
    /// * `max_retained` - Number of idle buffers kept for reuse
    pub fn new(size: usize, max_retained: usize) -> Self {
        Self {
            free_list: Mutex::new(Vec::with_capacity(max_retained)),
            buffer_size: size,
            max_retained,
            outstanding: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Rent a buffer with at least `minimum_size` bytes of capacity.
    ///
    /// Never fails: an empty free list or an oversized request falls back
    /// to a fresh allocation.
    pub fn rent(&self, minimum_size: usize) -> RentedBuffer<'_> {
        let pooled = minimum_size <= self.buffer_size;
        let reused = if pooled {
            self.free_list.lock().pop()
        } else {
            None
        };

        let buf = reused.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            let len = if pooled { self.buffer_size } else { minimum_size };
            vec![0u8; len].into_boxed_slice()
        });

        self.outstanding.fetch_add(1, Ordering::AcqRel);
        RentedBuffer {
            pool: self,
            buf: Some(buf),
            pooled,
        }
    }

    fn give_back(&self, buf: Box<[u8]>, pooled: bool) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if !pooled {
            return;
        }

        let mut free_list = self.free_list.lock();
        if free_list.len() < self.max_retained {
            free_list.push(buf);
        }
    }

    /// Get the size of each pooled buffer.
    #[cfg(test)]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of buffers currently rented out.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Number of idle buffers waiting for reuse.
    pub fn available(&self) -> usize {
        self.free_list.lock().len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            buffer_size: self.buffer_size,
            retained: self.available(),
            outstanding: self.outstanding(),
            allocated: self.allocated.load(Ordering::Relaxed),
        }
    }
}

/// A buffer on loan from a [`BufferPool`]. Returned to the pool on drop.
pub struct RentedBuffer<'a> {
    pool: &'a BufferPool,
    buf: Option<Box<[u8]>>,
    pooled: bool,
}

impl Deref for RentedBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }
}

impl DerefMut for RentedBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for RentedBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf, self.pooled);
        }
    }
}
