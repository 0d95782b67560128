//! Capture process configuration

use std::time::Duration;

/// Default capture program, resolved on `PATH`
pub const DEFAULT_PROGRAM: &str = "rpicam-vid";

/// Largest frame the scanner will accumulate: a 4K image at 24 bits per pixel
pub const MAX_FRAME_SIZE: usize = 3840 * 2160 * 3;

/// Smallest queue capacity that keeps eviction and draining race free
pub const MIN_QUEUE_CAPACITY: usize = 2;

/// Capture configuration options
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Requested frame width
    pub width: u32,

    /// Requested frame height
    pub height: u32,

    /// Capture binary
    pub program: String,

    /// Arguments placed before the standard invocation (for wrappers)
    pub wrapper_args: Vec<String>,

    /// Passthrough options appended after the standard invocation
    pub extra_args: Vec<String>,

    /// Upper bound on a single encoded frame
    pub max_frame_size: usize,

    /// Per-subscriber queue capacity
    pub queue_capacity: usize,

    /// Bytes requested per read from the capture output
    pub read_chunk_size: usize,

    /// Grace period after each teardown step before escalating
    pub stop_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            program: DEFAULT_PROGRAM.to_string(),
            wrapper_args: Vec::new(),
            extra_args: Vec::new(),
            max_frame_size: MAX_FRAME_SIZE,
            queue_capacity: MIN_QUEUE_CAPACITY,
            read_chunk_size: 64 * 1024, // 64KB
            stop_timeout: Duration::from_secs(3),
        }
    }
}

impl CaptureConfig {
    /// Create a new config with the given resolution
    pub fn with_resolution(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the resolution
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the capture program
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Run the capture program through a wrapper
    ///
    /// `program` becomes the wrapper and `args` precede the standard
    /// invocation, e.g. `("sh", ["-c", "exec rpicam-vid \"$@\"", "sh"])`.
    pub fn wrapper<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.wrapper_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append a passthrough option
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Rotate the image (no-op for 0)
    pub fn rotation(self, degrees: u32) -> Self {
        if degrees == 0 {
            return self;
        }
        self.arg("--rotation").arg(degrees.to_string())
    }

    /// Set the maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.max(2);
        self
    }

    /// Set the per-subscriber queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(MIN_QUEUE_CAPACITY);
        self
    }

    /// Set the read chunk size
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set the teardown grace period
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Estimated size of one frame, used to size fresh buffers
    ///
    /// Assumes 24 bits per pixel, which no JPEG should exceed.
    pub fn initial_buffer_size(&self) -> usize {
        let estimate = self.width as usize * self.height as usize * 3;
        estimate.min(self.max_frame_size)
    }

    /// Full argument list passed to the capture program
    pub fn args(&self) -> Vec<String> {
        let mut args = self.wrapper_args.clone();
        args.extend([
            "--timeout".to_string(),
            "0".to_string(), // run until signaled
            "--width".to_string(),
            self.width.to_string(),
            "--height".to_string(),
            self.height.to_string(),
            "--nopreview".to_string(),
            "--codec".to_string(),
            "mjpeg".to_string(),
            "--flush".to_string(),
            "--output".to_string(),
            "-".to_string(), // stdout
        ]);
        args.extend(self.extra_args.iter().cloned());
        args
    }
}
