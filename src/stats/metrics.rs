//! Statistics for the capture pipeline

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters updated by the capture loop and the registry
#[derive(Debug, Default)]
pub struct Counters {
    frames_published: AtomicU64,
    frames_evicted: AtomicU64,
    frames_oversized: AtomicU64,
    bytes_published: AtomicU64,
    sessions_started: AtomicU64,
    sessions_stopped: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_publish(&self, bytes: usize, evicted: u64) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_published.fetch_add(bytes as u64, Ordering::Relaxed);
        if evicted > 0 {
            self.frames_evicted.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_oversized(&self) {
        self.frames_oversized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_start(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_stop(&self) {
        self.sessions_stopped.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters into a snapshot
    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            frames_oversized: self.frames_oversized.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_stopped: self.sessions_stopped.load(Ordering::Relaxed),
            ..CaptureStats::default()
        }
    }
}

/// Point-in-time capture statistics
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    /// Frames handed to the registry
    pub frames_published: u64,
    /// Pending frames dropped to make room for newer ones
    pub frames_evicted: u64,
    /// Frames dropped for exceeding the scan bound
    pub frames_oversized: u64,
    /// Total bytes of published frames
    pub bytes_published: u64,
    /// Capture processes spawned
    pub sessions_started: u64,
    /// Capture sessions fully torn down
    pub sessions_stopped: u64,
    /// Currently attached subscribers
    pub subscribers: usize,
    /// Buffers waiting in the pool
    pub idle_buffers: usize,
    /// Whether a capture session is running
    pub streaming: bool,
}

impl CaptureStats {
    /// Sessions spawned but not yet torn down
    pub fn active_sessions(&self) -> u64 {
        self.sessions_started.saturating_sub(self.sessions_stopped)
    }

    /// Average published frame size in bytes
    pub fn average_frame_size(&self) -> u64 {
        if self.frames_published > 0 {
            self.bytes_published / self.frames_published
        } else {
            0
        }
    }
}
