//! Capture statistics

pub mod metrics;

pub use metrics::{CaptureStats, Counters};
