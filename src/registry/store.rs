//! Subscriber registry
//!
//! The registry maps subscriber ids to their frame queues and owns the
//! capture session slot. Both sit behind one `RwLock`: attach and detach
//! take it exclusively, so the empty to non-empty transition and the
//! session start it triggers happen atomically, while publishing only needs
//! shared access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, RwLock, RwLockReadGuard};

use super::frame::Frame;
use super::pool::BufferPool;
use super::queue::{FrameQueue, Pushed};
use super::subscription::Subscription;
use crate::capture::{CaptureConfig, Session};
use crate::error::{Error, Result};
use crate::stats::{CaptureStats, Counters};

/// Subscriber ids are unique across every registry in the process
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// State guarded by the registry lock
#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    queues: HashMap<u64, Arc<FrameQueue>>,
    /// Current capture session; holds a stopping session until reaped
    session: Option<Session>,
}

/// Central registry for subscribers and the capture session
#[derive(Debug)]
pub(crate) struct Registry {
    state: RwLock<RegistryState>,
    config: CaptureConfig,
    pool: BufferPool,
    counters: Counters,
    next_session_id: AtomicU64,
    next_sequence: AtomicU64,
}

impl Registry {
    pub(crate) fn new(config: CaptureConfig) -> Self {
        let pool = BufferPool::new(config.initial_buffer_size());
        Self {
            state: RwLock::new(RegistryState::default()),
            config,
            pool,
            counters: Counters::new(),
            next_session_id: AtomicU64::new(1),
            next_sequence: AtomicU64::new(1),
        }
    }

    pub(crate) fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub(crate) fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Shared access for publishing
    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().await
    }

    /// Register a new subscriber, starting the capture process if it is the
    /// first one.
    ///
    /// A capture start failure is returned to this caller only and leaves
    /// the registry empty.
    pub(crate) async fn attach(self: &Arc<Self>) -> Result<Subscription> {
        let mut state = self.state.write().await;

        if state.queues.is_empty() {
            // A previous session is stopping; never run two processes. It
            // stays in the slot until reaped so a cancelled attach leaves it
            // for the next one to wait on.
            if let Some(previous) = state.session.as_mut() {
                tracing::debug!(session_id = previous.id(), "Waiting for previous camera session");
                previous.join().await;
                state.session = None;
            }

            let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            let session = Session::start(self, session_id).map_err(|e| {
                tracing::error!(
                    session_id = session_id,
                    program = %self.config.program,
                    error = %e,
                    "Failed to start camera"
                );
                Error::CameraUnavailable(e)
            })?;
            self.counters.record_session_start();
            state.session = Some(session);
        }

        let id = NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(FrameQueue::new(self.config.queue_capacity));
        state.queues.insert(id, Arc::clone(&queue));

        tracing::info!(
            subscriber_id = id,
            subscribers = state.queues.len(),
            "Stream subscriber added"
        );

        Ok(Subscription::new(id, queue, Arc::clone(self)))
    }

    /// Remove a subscriber, stopping the capture process if none remain
    pub(crate) async fn detach(&self, id: u64) {
        let mut state = self.state.write().await;
        self.remove_locked(&mut state, id);
    }

    /// Like [`detach`](Self::detach), for callers outside the runtime
    pub(crate) fn detach_blocking(&self, id: u64) {
        let mut state = self.state.blocking_write();
        self.remove_locked(&mut state, id);
    }

    fn remove_locked(&self, state: &mut RegistryState, id: u64) {
        let Some(queue) = state.queues.remove(&id) else {
            return;
        };

        queue.close();
        // Nobody will pull these anymore
        drop(queue.drain());

        tracing::info!(
            subscriber_id = id,
            remaining = state.queues.len(),
            "Stream subscriber stopped"
        );

        if state.queues.is_empty() {
            if let Some(session) = state.session.as_mut() {
                session.stop();
            }
        }
    }

    /// Fan a frame out to every registered queue.
    ///
    /// Each subscriber gets its own handle and the release countdown starts
    /// at the number of queues present right now. Full queues drop their
    /// oldest frame. Returns the number of receivers.
    pub(crate) fn publish(&self, state: &RegistryState, bytes: Vec<u8>) -> usize {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let len = bytes.len();
        let receivers = state.queues.len();

        let mut evicted = 0;
        let frames = Frame::fan_out(bytes, sequence, &self.pool, receivers);
        for (queue, frame) in state.queues.values().zip(frames) {
            match queue.push(frame) {
                Pushed::Queued => {}
                Pushed::Replaced(old) => {
                    evicted += 1;
                    tracing::trace!(
                        dropped = old.sequence(),
                        sequence = sequence,
                        "Slow subscriber, dropped oldest frame"
                    );
                    old.release();
                }
                Pushed::Closed(frame) => frame.release(),
            }
        }

        self.counters.record_publish(len, evicted);
        receivers
    }

    /// Handle the capture process ending without a stop request.
    ///
    /// Every queue is closed and removed so blocked subscribers observe the
    /// end of their stream; the next attach starts a fresh session.
    pub(crate) async fn producer_exited(&self, session_id: u64, stop: &mut oneshot::Receiver<()>) {
        let mut state = tokio::select! {
            biased;
            // Last subscriber left meanwhile; the session is already stopping
            _ = stop => return,
            state = self.state.write() => state,
        };

        if state.session.as_ref().map(Session::id) != Some(session_id) {
            return;
        }
        state.session = None;

        let closed = state.queues.len();
        for (_, queue) in state.queues.drain() {
            queue.close();
        }

        tracing::warn!(
            session_id = session_id,
            closed = closed,
            "Capture process exited, closed subscriber streams"
        );
    }

    /// Close every subscriber and stop the capture session
    pub(crate) async fn shutdown(&self) {
        let mut state = self.state.write().await;

        let closed = state.queues.len();
        for (_, queue) in state.queues.drain() {
            queue.close();
        }

        if let Some(session) = state.session.as_mut() {
            tracing::info!(closed = closed, "Shutting down camera");
            session.join().await;
            state.session = None;
        }
    }

    pub(crate) async fn subscriber_count(&self) -> usize {
        self.state.read().await.queues.len()
    }

    pub(crate) async fn is_streaming(&self) -> bool {
        let state = self.state.read().await;
        state.session.as_ref().is_some_and(|s| !s.is_stopping())
    }

    pub(crate) async fn stats(&self) -> CaptureStats {
        let state = self.state.read().await;
        CaptureStats {
            subscribers: state.queues.len(),
            idle_buffers: self.pool.idle(),
            streaming: state.session.as_ref().is_some_and(|s| !s.is_stopping()),
            ..self.counters.snapshot()
        }
    }
}
