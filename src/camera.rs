//! Shared camera handle

use std::sync::Arc;

use crate::capture::CaptureConfig;
use crate::error::Result;
use crate::registry::{Registry, Subscription};
use crate::stats::CaptureStats;

/// A camera shared by any number of subscribers
///
/// The capture process starts with the first [`attach`](Self::attach) and
/// stops when the last subscription closes. Cloning is cheap; clones share
/// the same process and subscribers.
///
/// # Example
/// ```no_run
/// use rpicam_rs::{Camera, CaptureConfig};
///
/// # async fn example() -> rpicam_rs::Result<()> {
/// let camera = Camera::new(CaptureConfig::with_resolution(1280, 720).rotation(180));
///
/// let stream = camera.attach().await?;
/// while let Ok(frame) = stream.pull().await {
///     println!("frame {} ({} bytes)", frame.sequence(), frame.len());
///     frame.release();
/// }
/// stream.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Camera {
    registry: Arc<Registry>,
}

impl Camera {
    /// Create a camera; nothing is spawned until the first attach
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new(config)),
        }
    }

    /// Subscribe to the frame stream.
    ///
    /// Starts the capture process if this is the only subscriber, waiting
    /// for a previous process to finish tearing down first. Returns
    /// [`Error::CameraUnavailable`](crate::Error::CameraUnavailable) if it
    /// cannot be started.
    pub async fn attach(&self) -> Result<Subscription> {
        self.registry.attach().await
    }

    /// Number of attached subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.registry.subscriber_count().await
    }

    /// Whether a capture session is running and not stopping
    pub async fn is_streaming(&self) -> bool {
        self.registry.is_streaming().await
    }

    /// Current statistics
    pub async fn stats(&self) -> CaptureStats {
        self.registry.stats().await
    }

    /// End every subscription and stop the capture process.
    ///
    /// Subscribers observe the end of their streams. The camera stays
    /// usable; a later attach starts a new session.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await
    }

    /// Get the capture configuration
    pub fn config(&self) -> &CaptureConfig {
        self.registry.config()
    }
}
