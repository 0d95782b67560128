//! Shared MJPEG camera streaming
//!
//! `rpicam-rs` runs a single `rpicam-vid` capture process and hands its
//! JPEG frames to any number of concurrent subscribers. The process starts
//! with the first subscriber and stops after the last one leaves.
//!
//! # Overview
//!
//! - [`Camera`]: entry point; [`Camera::attach`] returns a [`Subscription`]
//! - [`Subscription::pull`]: wait for the freshest frame
//! - [`Frame::release`]: hand the frame's buffer back for reuse
//!
//! Slow subscribers never hold up the capture: each has a queue of two
//! frames and the oldest is dropped when a new one arrives.
//!
//! The [`mjpeg`] module encodes frames as `multipart/x-mixed-replace` parts
//! for serving over HTTP.

pub mod camera;
pub mod capture;
pub mod error;
pub mod mjpeg;
pub mod registry;
pub mod stats;

pub use camera::Camera;
pub use capture::CaptureConfig;
pub use error::{Error, Result};
pub use registry::{Frame, Subscription};
pub use stats::CaptureStats;
