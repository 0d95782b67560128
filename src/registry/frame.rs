//! Published frames
//!
//! One copy of the image bytes is shared by every subscriber that received
//! it. Each subscriber holds its own [`Frame`] handle and releases it once
//! done. The bytes return to the pool when the last handle lets go of the
//! shared storage, which every handle does right after its release. The
//! countdown set at publish time mirrors the handles still outstanding and
//! is only there to be observed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::pool::BufferPool;

/// Shared backing storage for one published image
#[derive(Debug)]
struct FrameData {
    bytes: Vec<u8>,
    sequence: u64,
    /// Handles not yet released; reaches zero just before the buffer returns
    remaining: AtomicUsize,
    pool: BufferPool,
}

impl Drop for FrameData {
    fn drop(&mut self) {
        debug_assert_eq!(*self.remaining.get_mut(), 0);
        self.pool.release(std::mem::take(&mut self.bytes));
    }
}

/// A complete JPEG image delivered to one subscriber
///
/// The bytes are read-only. Call [`release`](Self::release) when finished;
/// dropping the frame releases it as well.
#[derive(Debug)]
pub struct Frame {
    data: Arc<FrameData>,
}

impl Frame {
    /// Wrap `bytes` for `receivers` subscribers, yielding one handle each.
    ///
    /// With no receivers the buffer goes straight back to the pool.
    pub(crate) fn fan_out(
        bytes: Vec<u8>,
        sequence: u64,
        pool: &BufferPool,
        receivers: usize,
    ) -> impl Iterator<Item = Frame> {
        let data = Arc::new(FrameData {
            bytes,
            sequence,
            remaining: AtomicUsize::new(receivers),
            pool: pool.clone(),
        });

        (0..receivers).map(move |_| Frame {
            data: Arc::clone(&data),
        })
    }

    /// Encoded image bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data.bytes
    }

    /// Image size in bytes
    pub fn len(&self) -> usize {
        self.data.bytes.len()
    }

    /// Whether the image is empty
    pub fn is_empty(&self) -> bool {
        self.data.bytes.is_empty()
    }

    /// Publish order of this frame, increasing across sessions
    pub fn sequence(&self) -> u64 {
        self.data.sequence
    }

    /// Subscribers that have not yet released this frame, including this one.
    ///
    /// Informational only: the buffer is reclaimed by the last handle's
    /// drop, not by reading this count.
    pub fn pending_releases(&self) -> usize {
        self.data.remaining.load(Ordering::Acquire)
    }

    /// Release this subscriber's hold on the frame
    pub fn release(self) {
        drop(self);
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let prev = self.data.remaining.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            tracing::trace!(sequence = self.data.sequence, "Frame fully released");
        }
    }
}
