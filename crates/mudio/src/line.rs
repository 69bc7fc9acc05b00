use bytes::{Buf, BytesMut};
use memchr::memchr2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    TooLong { max: usize },
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineError::TooLong { max } => write!(f, "line too long (max {max} bytes)"),
        }
    }
}

impl std::error::Error for LineError {}

/// Accumulates telnet data bytes and splits them into lines.
///
/// Telnet clients send CRLF, but bare LF, bare CR and CR NUL all show up in
/// the wild. Any of `\r` / `\n` ends a line; a `\n` or `\0` right after a `\r`
/// is swallowed even when it arrives in the next chunk.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    max_line_len: usize,
    after_cr: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            max_line_len: 4 * 1024,
            after_cr: false,
        }
    }

    pub fn max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max.max(1);
        self
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pop one complete line without its terminator, lossily decoded as UTF-8.
    ///
    /// Returns:
    /// - `Some(Ok(line))` for a line (may be empty),
    /// - `None` when no terminator is buffered yet,
    /// - `Some(Err(..))` when the pending partial line exceeds the limit; the
    ///   partial line is discarded so the caller can keep reading.
    pub fn pop_line(&mut self) -> Option<Result<String, LineError>> {
        if self.after_cr {
            if let Some(&b) = self.buf.first() {
                if b == b'\n' || b == 0 {
                    self.buf.advance(1);
                }
                self.after_cr = false;
            }
        }

        let Some(i) = memchr2(b'\n', b'\r', &self.buf) else {
            if self.buf.len() > self.max_line_len {
                self.buf.clear();
                return Some(Err(LineError::TooLong {
                    max: self.max_line_len,
                }));
            }
            return None;
        };

        let line = self.buf.split_to(i).freeze();
        let eol = self.buf.get_u8();
        if eol == b'\r' {
            match self.buf.first() {
                Some(b'\n') | Some(0) => self.buf.advance(1),
                Some(_) => {}
                None => self.after_cr = true,
            }
        }

        if line.len() > self.max_line_len {
            return Some(Err(LineError::TooLong {
                max: self.max_line_len,
            }));
        }
        Some(Ok(String::from_utf8_lossy(&line).into_owned()))
    }
}
