//! Subscriber handle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::frame::Frame;
use super::queue::FrameQueue;
use super::store::Registry;
use crate::error::{Error, Result};

/// A single consumer's view of the camera stream
///
/// Frames arrive in publish order, but a consumer that falls behind skips
/// the oldest pending frames. Closing or dropping the subscription removes
/// it from the registry; the last one to go stops the capture process.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    queue: Arc<FrameQueue>,
    registry: Arc<Registry>,
    closed: AtomicBool,
    /// Set only once the registry no longer holds this subscriber
    detached: AtomicBool,
    ended: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: u64, queue: Arc<FrameQueue>, registry: Arc<Registry>) -> Self {
        Self {
            id,
            queue,
            registry,
            closed: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        }
    }

    /// Unique subscriber id, never reused within the process
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next frame.
    ///
    /// Returns [`Error::EndOfStream`] once when the stream ends (closed by
    /// [`close`](Self::close) from another task, or the capture process
    /// exited). Every later call, and any call after `close`, returns
    /// [`Error::Closed`] without blocking.
    pub async fn pull(&self) -> Result<Frame> {
        if self.closed.load(Ordering::Acquire) || self.ended.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        match self.queue.pop().await {
            Some(frame) => Ok(frame),
            None => {
                if self.ended.swap(true, Ordering::AcqRel) {
                    Err(Error::Closed)
                } else {
                    Err(Error::EndOfStream)
                }
            }
        }
    }

    /// Take a frame if one is already waiting
    pub fn try_pull(&self) -> Option<Frame> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        self.queue.try_pop()
    }

    /// Number of frames waiting
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Unregister from the camera. Idempotent.
    ///
    /// A `pull` blocked on this subscription in another task wakes with
    /// [`Error::EndOfStream`]. If the call is cancelled before the registry
    /// is updated, a later `close` or the drop finishes the detach.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if self.detached.load(Ordering::Acquire) {
            return;
        }
        self.registry.detach(self.id).await;
        self.detached.store(true, Ordering::Release);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        if self.detached.load(Ordering::Acquire) {
            return;
        }

        // Closing now wakes nobody (we are the only owner) but frees the
        // queued frames before the registry gets to it
        self.queue.close();
        drop(self.queue.drain());

        let registry = Arc::clone(&self.registry);
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    registry.detach(id).await;
                });
            }
            Err(_) => registry.detach_blocking(id),
        }
    }
}
