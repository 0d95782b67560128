//! MJPEG frame splitting
//!
//! The capture process writes encoded JPEG images back to back with no
//! length prefix. Each image ends with the end-of-image marker `FF D9`,
//! which is the only boundary the splitter relies on.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// JPEG end-of-image marker
pub const END_OF_IMAGE: [u8; 2] = [0xFF, 0xD9];

/// Result of splitting an accumulated byte stream
#[derive(Debug, PartialEq, Eq)]
pub enum Split<'a> {
    /// A complete frame; `consumed` bytes may be discarded from the input
    Frame { consumed: usize, frame: &'a [u8] },
    /// No marker yet, more bytes are required
    NeedMore,
    /// The input is finished and holds no further frame
    Done,
}

/// Split the next frame off the front of `buf`.
///
/// Partial frames are normal: without a marker the splitter asks for more
/// bytes instead of failing. Once `at_end` is set and no marker remains, any
/// trailing bytes are an incomplete image and the stream is reported done.
pub fn split(buf: &[u8], at_end: bool) -> Split<'_> {
    split_from(buf, 0, at_end)
}

/// Like [`split`], skipping the first `from` bytes already known to hold no
/// marker.
fn split_from(buf: &[u8], from: usize, at_end: bool) -> Split<'_> {
    match find_marker(buf, from) {
        Some(end) => Split::Frame {
            consumed: end,
            frame: &buf[..end],
        },
        None if at_end => Split::Done,
        None => Split::NeedMore,
    }
}

/// Offset just past the first marker at or after `from`
fn find_marker(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(END_OF_IMAGE.len())
        .position(|w| w == END_OF_IMAGE)
        .map(|i| from + i + END_OF_IMAGE.len())
}

/// Error produced while scanning for frames
#[derive(Debug)]
pub enum ScanError {
    /// A frame grew past the scan bound; `discarded` bytes were dropped
    Oversized { discarded: usize },
    /// Reading the underlying source failed
    Io(io::Error),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Oversized { discarded } => {
                write!(f, "Frame exceeds scan buffer, discarded {} bytes", discarded)
            }
            ScanError::Io(e) => write!(f, "Read failed: {}", e),
        }
    }
}

impl std::error::Error for ScanError {}

/// Accumulates bytes from a reader and yields whole frames.
///
/// Frames returned by [`next_frame`](Self::next_frame) borrow the scan
/// buffer and are overwritten by the following call, so callers copy them
/// out before reading again.
pub struct FrameScanner<R> {
    reader: R,
    buf: Vec<u8>,
    /// Start of the unconsumed region
    start: usize,
    /// Bytes of the unconsumed region already searched
    searched: usize,
    max_size: usize,
    chunk_size: usize,
    eof: bool,
    /// Drop everything up to the next marker (tail of an oversized frame)
    resync: bool,
}

impl<R: AsyncRead + Unpin> FrameScanner<R> {
    /// Create a scanner with an initial buffer capacity and a hard bound on
    /// the size of a single frame.
    pub fn new(reader: R, initial_capacity: usize, max_size: usize, chunk_size: usize) -> Self {
        let max_size = max_size.max(END_OF_IMAGE.len());
        Self {
            reader,
            buf: Vec::with_capacity(initial_capacity.min(max_size)),
            start: 0,
            searched: 0,
            max_size,
            chunk_size: chunk_size.max(1),
            eof: false,
            resync: false,
        }
    }

    /// Read until the next complete frame.
    ///
    /// Returns `Ok(None)` at a clean end of stream. An oversized frame is
    /// reported once as [`ScanError::Oversized`]; scanning may continue
    /// afterwards and resumes at the frame following it.
    pub async fn next_frame(&mut self) -> Result<Option<&[u8]>, ScanError> {
        loop {
            let pending = &self.buf[self.start..];
            let found = match split_from(pending, self.searched, self.eof) {
                Split::Frame { consumed, frame } => Some((consumed, frame.len())),
                Split::Done => {
                    if !pending.is_empty() {
                        tracing::debug!(bytes = pending.len(), "Discarding trailing partial frame");
                    }
                    return Ok(None);
                }
                Split::NeedMore => None,
            };

            if let Some((consumed, len)) = found {
                let begin = self.start;
                self.start += consumed;
                self.searched = 0;

                if self.resync {
                    self.resync = false;
                    tracing::debug!(bytes = len, "Discarded tail of oversized frame");
                    continue;
                }

                return Ok(Some(&self.buf[begin..begin + len]));
            }

            // The last byte may be the first half of a marker
            self.searched = pending.len().saturating_sub(1);

            if pending.len() >= self.max_size {
                // Keep the last byte, it may begin the marker
                let discarded = pending.len() - 1;
                let last = pending[discarded];
                self.buf.clear();
                self.buf.push(last);
                self.start = 0;
                self.searched = 0;

                if self.resync {
                    tracing::trace!(bytes = discarded, "Still skipping oversized frame");
                    continue;
                }
                self.resync = true;
                return Err(ScanError::Oversized { discarded });
            }

            self.fill().await.map_err(ScanError::Io)?;
        }
    }

    /// Read one chunk into the buffer, compacting consumed bytes first
    async fn fill(&mut self) -> io::Result<()> {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }

        let filled = self.buf.len();
        let want = self.chunk_size.min(self.max_size - filled);
        self.buf.resize(filled + want, 0);

        match self.reader.read(&mut self.buf[filled..]).await {
            Ok(n) => {
                self.buf.truncate(filled + n);
                if n == 0 {
                    self.eof = true;
                }
                Ok(())
            }
            Err(e) => {
                self.buf.truncate(filled);
                Err(e)
            }
        }
    }

    /// Recover the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut v = vec![0xFF, 0xD8];
        v.extend_from_slice(body);
        v.extend_from_slice(&END_OF_IMAGE);
        v
    }

    #[test]
    fn test_split_single_frame() {
        let data = jpeg(b"abc");
        match split(&data, false) {
            Split::Frame { consumed, frame } => {
                assert_eq!(consumed, data.len());
                assert_eq!(frame, &data[..]);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_split_leaves_next_frame() {
        let mut data = jpeg(b"one");
        let first_len = data.len();
        data.extend_from_slice(&jpeg(b"two"));

        let Split::Frame { consumed, .. } = split(&data, false) else {
            panic!("expected frame");
        };
        assert_eq!(consumed, first_len);

        let Split::Frame { frame, .. } = split(&data[consumed..], false) else {
            panic!("expected frame");
        };
        assert_eq!(frame, &jpeg(b"two")[..]);
    }

    #[test]
    fn test_split_partial_requests_more() {
        assert_eq!(split(&[0xFF, 0xD8, 0x01, 0xFF], false), Split::NeedMore);
        assert_eq!(split(&[], false), Split::NeedMore);
    }

    #[test]
    fn test_split_at_end() {
        assert_eq!(split(&[], true), Split::Done);
        // Trailing partial image is not reported as a frame
        assert_eq!(split(&[0xFF, 0xD8, 0x01], true), Split::Done);
        // A complete frame is still returned at end
        assert!(matches!(split(&jpeg(b"x"), true), Split::Frame { .. }));
    }

    #[test]
    fn test_split_marker_only() {
        let Split::Frame { consumed, frame } = split(&END_OF_IMAGE, false) else {
            panic!("expected frame");
        };
        assert_eq!(consumed, 2);
        assert_eq!(frame, &END_OF_IMAGE);
    }

    #[test]
    fn test_find_marker_from_offset() {
        let data = [0x00, 0xFF, 0xD9, 0x00, 0xFF, 0xD9];
        assert_eq!(find_marker(&data, 0), Some(3));
        assert_eq!(find_marker(&data, 3), Some(6));
        assert_eq!(find_marker(&data, 6), None);
        assert_eq!(find_marker(&data, 10), None);
    }

    #[tokio::test]
    async fn test_scanner_marker_split_across_reads() {
        let data = [jpeg(b"first"), jpeg(b"second")].concat();
        // One byte per read puts every marker across a read boundary
        let mut scanner = FrameScanner::new(&data[..], 16, 1024, 1);

        assert_eq!(scanner.next_frame().await.unwrap(), Some(&jpeg(b"first")[..]));
        assert_eq!(scanner.next_frame().await.unwrap(), Some(&jpeg(b"second")[..]));
        assert_eq!(scanner.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scanner_discards_trailing_partial() {
        let mut data = jpeg(b"whole");
        data.extend_from_slice(&[0xFF, 0xD8, 0x42]);
        let mut scanner = FrameScanner::new(&data[..], 16, 1024, 4);

        assert_eq!(scanner.next_frame().await.unwrap(), Some(&jpeg(b"whole")[..]));
        assert_eq!(scanner.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scanner_recovers_from_oversized_frame() {
        let big = jpeg(&[0x11; 100]);
        let data = [jpeg(b"ok"), big, jpeg(b"after")].concat();
        let mut scanner = FrameScanner::new(&data[..], 8, 32, 8);

        assert_eq!(scanner.next_frame().await.unwrap(), Some(&jpeg(b"ok")[..]));

        match scanner.next_frame().await {
            Err(ScanError::Oversized { discarded }) => assert_eq!(discarded, 31),
            other => panic!("expected oversized, got {:?}", other),
        }

        // The tail of the oversized frame is skipped, not published
        assert_eq!(scanner.next_frame().await.unwrap(), Some(&jpeg(b"after")[..]));
        assert_eq!(scanner.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scanner_empty_source() {
        let mut scanner = FrameScanner::new(&[][..], 8, 32, 8);
        assert_eq!(scanner.next_frame().await.unwrap(), None);
    }
}
