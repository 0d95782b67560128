//! Per-subscriber frame queue
//!
//! A small bounded queue with a drop-oldest policy: pushing into a full
//! queue evicts the oldest pending frame instead of waiting. The publisher
//! therefore never blocks on a slow subscriber, and the subscriber always
//! sees the freshest frames in publish order.
//!
//! Eviction and draining happen under the same per-queue lock, so a
//! subscriber popping while the publisher evicts cannot lose the new frame
//! or observe a duplicate.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::frame::Frame;

/// Outcome of pushing a frame
#[derive(Debug)]
pub(crate) enum Pushed {
    /// The frame was queued
    Queued,
    /// The frame was queued after evicting the returned oldest frame
    Replaced(Frame),
    /// The queue is closed; the frame is handed back
    Closed(Frame),
}

#[derive(Debug)]
struct QueueState {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Bounded queue feeding one subscription
#[derive(Debug)]
pub(crate) struct FrameQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl FrameQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue without blocking, evicting the oldest frame when full.
    ///
    /// Evicted frames are returned rather than dropped here so their release
    /// happens outside the queue lock.
    pub(crate) fn push(&self, frame: Frame) -> Pushed {
        let mut state = self.lock();
        if state.closed {
            return Pushed::Closed(frame);
        }

        let evicted = if state.frames.len() >= self.capacity {
            state.frames.pop_front()
        } else {
            None
        };
        state.frames.push_back(frame);
        drop(state);

        self.notify.notify_one();

        match evicted {
            Some(old) => Pushed::Replaced(old),
            None => Pushed::Queued,
        }
    }

    /// Take the oldest pending frame without waiting
    pub(crate) fn try_pop(&self) -> Option<Frame> {
        self.lock().frames.pop_front()
    }

    /// Wait for the next frame.
    ///
    /// Pending frames are still delivered after close; `None` means the
    /// queue is closed and empty.
    pub(crate) async fn pop(&self) -> Option<Frame> {
        loop {
            // Registered before checking state so a push or close racing
            // with the check still wakes this waiter
            let notified = self.notify.notified();

            {
                let mut state = self.lock();
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Close the queue, waking any waiting subscriber
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Remove every pending frame
    pub(crate) fn drain(&self) -> Vec<Frame> {
        self.lock().frames.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().frames.len()
    }
}
