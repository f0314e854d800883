//! IRC line framing.
//!
//! Extracts complete lines from an incremental byte stream. A line is
//! terminated by CR, LF, or CRLF and is at most 512 bytes long including
//! the terminator (RFC 1459 section 2.3).

use thiserror::Error;

/// Maximum length of one IRC line in bytes, terminator included.
pub const MAX_LINE_LEN: usize = 512;

/// Line framing errors.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("line exceeds {MAX_LINE_LEN} bytes")]
    TooLong,
}

/// Incremental buffer yielding complete IRC lines.
///
/// Input bytes are opaque; non-UTF-8 sequences are replaced lossily when a
/// line is produced. Empty lines (bare terminators, or the LF half of a
/// CRLF split across reads) are yielded as empty strings so callers can
/// skip them.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next complete line, if one has fully arrived.
    pub fn next_line(&mut self) -> Result<Option<String>, LineError> {
        match self.buf.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(pos) => {
                let mut end = pos + 1;
                if self.buf[pos] == b'\r' && self.buf.get(end) == Some(&b'\n') {
                    end += 1;
                }
                if end > MAX_LINE_LEN {
                    return Err(LineError::TooLong);
                }
                let line: Vec<u8> = self.buf.drain(..end).take(pos).collect();
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None if self.buf.len() >= MAX_LINE_LEN => Err(LineError::TooLong),
            None => Ok(None),
        }
    }
}
