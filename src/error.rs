//! Error types
//!
//! Errors surfaced to consumers of the camera. Failures inside the capture
//! loop never reach consumers directly; they show up as skipped frames or as
//! the end of a stream.

use std::io;

/// Error type for camera operations
#[derive(Debug)]
pub enum Error {
    /// The capture process could not be started
    CameraUnavailable(io::Error),
    /// The frame queue was closed and no frames remain
    EndOfStream,
    /// The subscription was already closed or its end was already reported
    Closed,
}

impl Error {
    /// Whether this error means the capture process failed to start
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::CameraUnavailable(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::CameraUnavailable(e) => write!(f, "Camera unavailable: {}", e),
            Error::EndOfStream => write!(f, "No more frames to read"),
            Error::Closed => write!(f, "Stream closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::CameraUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

/// Result alias for camera operations
pub type Result<T> = std::result::Result<T, Error>;
