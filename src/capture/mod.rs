//! Capture process handling
//!
//! This module provides:
//! - Configuration and invocation of the capture program
//! - MJPEG frame splitting on the end-of-image marker
//! - Supervision of the single capture session

pub mod config;
pub mod framer;
pub(crate) mod supervisor;

pub use config::CaptureConfig;
pub use framer::{split, FrameScanner, ScanError, Split, END_OF_IMAGE};
pub(crate) use supervisor::Session;
