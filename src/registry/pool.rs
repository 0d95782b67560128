//! Reusable frame buffers
//!
//! Every published frame is copied out of the scan buffer into a buffer
//! checked out of this pool. The buffer comes back only once the last
//! consumer has released the frame, so a pooled buffer is never referenced
//! by a live frame.

use std::sync::{Arc, Mutex, PoisonError};

/// Number of idle buffers kept before extras are freed
pub const DEFAULT_MAX_IDLE: usize = 16;

/// Shared pool of frame buffers
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    idle: Mutex<Vec<Vec<u8>>>,
    initial_capacity: usize,
    max_idle: usize,
}

impl BufferPool {
    /// Create a pool whose fresh buffers start at `initial_capacity` bytes
    pub fn new(initial_capacity: usize) -> Self {
        Self::with_max_idle(initial_capacity, DEFAULT_MAX_IDLE)
    }

    /// Create a pool retaining at most `max_idle` buffers
    pub fn with_max_idle(initial_capacity: usize, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                initial_capacity,
                max_idle,
            }),
        }
    }

    /// Check out an empty buffer able to hold `len` bytes without growing.
    ///
    /// Reuses an idle buffer when one exists, growing it if undersized.
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        let reused = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match reused {
            Some(mut buf) => {
                buf.clear();
                buf.reserve(len);
                buf
            }
            None => Vec::with_capacity(len.max(self.inner.initial_capacity)),
        }
    }

    /// Check a buffer back in
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();

        let mut idle = self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.inner.max_idle {
            idle.push(buf);
        }
    }

    /// Number of buffers waiting for reuse
    pub fn idle(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
