//! Line accumulation for the GI command stream

use crate::{
    constants::*,
    error::{GiError, GiResult},
};
use bytes::{Buf, BytesMut};

/// Growable buffer that yields newline-terminated lines
pub struct LineBuffer {
    buffer: BytesMut,
    max_line: usize,
    /// Dropping the tail of an overlong line up to its newline
    discarding: bool,
}

impl LineBuffer {
    /// Create a buffer refusing lines longer than `max_line` bytes
    pub fn new(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(BUF_CHUNK.min(max_line + 1)),
            max_line,
            discarding: false,
        }
    }

    /// Get current length of buffered data
    pub fn len(&self) -> usize {
        self.buffer
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer
            .is_empty()
    }

    /// Append bytes read from the stream
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        if self
            .buffer
            .capacity()
            - self
                .buffer
                .len()
            < data.len()
        {
            let old_cap = self
                .buffer
                .capacity();
            self.buffer
                .reserve(
                    data.len()
                        .max(BUF_CHUNK),
                );
            tracing::trace!(
                "Line buffer grew from {} to {} bytes",
                old_cap,
                self.buffer
                    .capacity()
            );
        }
        self.buffer
            .extend_from_slice(data);
    }

    /// Find position of the next newline
    pub fn find_newline(&self) -> Option<usize> {
        self.buffer
            .iter()
            .position(|&b| b == b'\n')
    }

    /// Extract the next complete line without its terminator.
    ///
    /// A trailing carriage return is stripped as well. Returns `Ok(None)`
    /// when no complete line is buffered yet, and `Err(LineTooLong)` once
    /// per overlong line. The whole overlong line is dropped, including
    /// any part still to arrive, and the next line is returned normally.
    pub fn next_line(&mut self) -> GiResult<Option<String>> {
        if self.discarding {
            match self.find_newline() {
                Some(pos) => {
                    self.buffer
                        .advance(pos + 1);
                    self.discarding = false;
                }
                None => {
                    self.buffer
                        .clear();
                    return Ok(None);
                }
            }
        }

        match self.find_newline() {
            Some(pos) if pos > self.max_line => {
                self.buffer
                    .advance(pos + 1);
                Err(GiError::LineTooLong {
                    size: pos,
                    limit: self.max_line,
                })
            }
            Some(pos) => {
                let mut line = self
                    .buffer
                    .split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(pos - 1);
                }
                Ok(Some(
                    String::from_utf8_lossy(&line).into_owned(),
                ))
            }
            None => {
                self.check_size_limits()?;
                Ok(None)
            }
        }
    }

    /// Check if an unterminated line exceeds the limit
    pub fn check_size_limits(&mut self) -> GiResult<()> {
        let size = self
            .buffer
            .len();
        if size > self.max_line {
            tracing::warn!(
                "Line overflow: {} bytes without newline (limit {})",
                size,
                self.max_line
            );
            self.buffer
                .clear();
            self.discarding = true;
            return Err(GiError::LineTooLong {
                size,
                limit: self.max_line,
            });
        }
        Ok(())
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut buffer = LineBuffer::default();
        assert_eq!(buffer.len(), 0);

        buffer.extend_from_slice(b"ANSWER");
        assert_eq!(buffer.len(), 6);
        assert_eq!(
            buffer
                .next_line()
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_lines_split_across_reads() {
        let mut buffer = LineBuffer::default();
        buffer.extend_from_slice(b"STREAM FI");
        assert_eq!(
            buffer
                .next_line()
                .unwrap(),
            None
        );
        buffer.extend_from_slice(b"LE demo \"\"\nNOOP\n");
        assert_eq!(
            buffer
                .next_line()
                .unwrap()
                .as_deref(),
            Some("STREAM FILE demo \"\"")
        );
        assert_eq!(
            buffer
                .next_line()
                .unwrap()
                .as_deref(),
            Some("NOOP")
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_carriage_return_stripped() {
        let mut buffer = LineBuffer::default();
        buffer.extend_from_slice(b"NOOP\r\n");
        assert_eq!(
            buffer
                .next_line()
                .unwrap()
                .as_deref(),
            Some("NOOP")
        );
    }

    #[test]
    fn test_empty_line() {
        let mut buffer = LineBuffer::default();
        buffer.extend_from_slice(b"\n");
        assert_eq!(
            buffer
                .next_line()
                .unwrap()
                .as_deref(),
            Some("")
        );
    }

    #[test]
    fn test_overflow_without_newline() {
        let mut buffer = LineBuffer::new(8);
        buffer.extend_from_slice(b"0123456789");
        match buffer.next_line() {
            Err(GiError::LineTooLong { size, limit }) => {
                assert_eq!(size, 10);
                assert_eq!(limit, 8);
            }
            other => panic!("expected overflow, got {:?}", other),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_drops_rest_of_line() {
        let mut buffer = LineBuffer::new(8);
        buffer.extend_from_slice(b"VERBOSE 0123456789");
        assert!(buffer
            .next_line()
            .is_err());

        buffer.extend_from_slice(b"abcdefghij");
        assert_eq!(
            buffer
                .next_line()
                .unwrap(),
            None
        );
        assert!(buffer.is_empty());

        buffer.extend_from_slice(b"xyz\nNOOP\n");
        assert_eq!(
            buffer
                .next_line()
                .unwrap()
                .as_deref(),
            Some("NOOP")
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_with_newline_keeps_following_lines() {
        let mut buffer = LineBuffer::new(4);
        buffer.extend_from_slice(b"TOOLONG\nNOOP\n");
        assert!(buffer
            .next_line()
            .is_err());
        assert_eq!(
            buffer
                .next_line()
                .unwrap()
                .as_deref(),
            Some("NOOP")
        );
    }
}
