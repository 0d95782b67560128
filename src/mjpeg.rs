//! MJPEG over HTTP framing
//!
//! Encodes frames as parts of a `multipart/x-mixed-replace` response body.
//! Every part carries its own `Content-Length` header.

use bytes::{BufMut, Bytes, BytesMut};

/// Boundary used when none is given
pub const DEFAULT_BOUNDARY: &str = "rpicamframe";

/// Encoder for the parts of an MJPEG response body
#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    boundary: String,
}

impl MultipartEncoder {
    /// Create an encoder with the given boundary token
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
        }
    }

    /// Boundary token
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the response `Content-Type` header
    pub fn content_type(&self) -> String {
        format!("multipart/x-mixed-replace; boundary={}", self.boundary)
    }

    /// Encode one JPEG image as a body part
    pub fn encode_part(&self, jpeg: &[u8]) -> Bytes {
        let header = format!(
            "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            self.boundary,
            jpeg.len()
        );

        let mut buf = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
        buf.put_slice(header.as_bytes());
        buf.put_slice(jpeg);
        buf.put_slice(b"\r\n");
        buf.freeze()
    }

    /// Terminating delimiter of the body
    pub fn closing(&self) -> Bytes {
        Bytes::from(format!("--{}--\r\n", self.boundary))
    }
}

impl Default for MultipartEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARY)
    }
}
