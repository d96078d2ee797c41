//! Newline framing and text rendering of serial lines.
//!
//! A line is every byte up to and including `\n`. Bytes after the last
//! newline stay in the [`LineBuffer`] until a later chunk completes them.
//! Rendering is total: invalid UTF-8 becomes U+FFFD and never fails.

use bytes::{Bytes, BytesMut};
use std::io::{self, Write};

/// Accumulates payload chunks and hands out complete lines in arrival order.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
    /// Leading bytes of `buf` already known to hold no newline
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of payload.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Remove and return the oldest complete line, newline included.
    pub fn next_line(&mut self) -> Option<Bytes> {
        match self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;
                self.scanned = 0;
                Some(self.buf.split_to(end + 1).freeze())
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    /// Remove and return bytes that are not yet terminated by a newline.
    pub fn take_partial(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            self.scanned = 0;
            Some(self.buf.split().freeze())
        }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Decode a line for display: lossy UTF-8, trailing whitespace removed.
///
/// The ASCII information separators U+001C..=U+001F count as whitespace.
pub fn decode_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line)
        .trim_end_matches(is_trailing_space)
        .to_string()
}

fn is_trailing_space(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// Write a received line to `out`.
///
/// Empty input (a read that timed out) writes nothing. Anything else writes
/// exactly one newline-terminated line, even if it decodes to blank.
pub fn emit<W: Write + ?Sized>(line: &[u8], out: &mut W) -> io::Result<()> {
    if line.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}", decode_line(line))?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn emitted(line: &[u8]) -> String {
        let mut out = Vec::new();
        emit(line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test_case(b"HELLO\r\n", "HELLO\n"; "crlf")]
    #[test_case(b"HELLO\n", "HELLO\n"; "lf")]
    #[test_case(b"temp=21.5  \t\n", "temp=21.5\n"; "trailing whitespace")]
    #[test_case(b"  indented\n", "  indented\n"; "leading whitespace kept")]
    #[test_case(b"\r\n", "\n"; "blank line")]
    #[test_case(b"A\xffB\n", "A\u{FFFD}B\n"; "invalid byte")]
    #[test_case(b"\xe2\x82\n", "\u{FFFD}\n"; "truncated sequence")]
    #[test_case("caf\u{e9}\n".as_bytes(), "caf\u{e9}\n"; "valid utf8")]
    #[test_case(b"A\x1fB\x1c\n", "A\x1fB\n"; "trailing separators")]
    #[test_case(b"end\x0b\x0c\xc2\xa0\n", "end\n"; "trailing vt ff nbsp")]
    fn test_emit(line: &[u8], expected: &str) {
        assert_eq!(emitted(line), expected);
    }

    #[test]
    fn test_emit_empty_is_noop() {
        assert_eq!(emitted(b""), "");
    }

    #[test]
    fn test_lines_in_arrival_order() {
        let mut lines = LineBuffer::new();
        lines.extend(b"one\ntwo\r\nthr");
        assert_eq!(lines.next_line().unwrap(), &b"one\n"[..]);
        assert_eq!(lines.next_line().unwrap(), &b"two\r\n"[..]);
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.len(), 3);

        lines.extend(b"ee\n");
        assert_eq!(lines.next_line().unwrap(), &b"three\n"[..]);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_take_partial() {
        let mut lines = LineBuffer::new();
        assert_eq!(lines.take_partial(), None);

        lines.extend(b"done\npending");
        assert_eq!(lines.next_line().unwrap(), &b"done\n"[..]);
        assert_eq!(lines.take_partial().unwrap(), &b"pending"[..]);
        assert!(lines.is_empty());
        assert_eq!(lines.take_partial(), None);
    }

    #[test]
    fn test_long_line_in_single_bytes() {
        let mut lines = LineBuffer::new();
        for _ in 0..100_000 {
            lines.extend(b"x");
            assert_eq!(lines.next_line(), None);
        }
        assert_eq!(lines.scanned, 100_000);

        lines.extend(b"\nnext");
        let line = lines.next_line().unwrap();
        assert_eq!(line.len(), 100_001);
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.take_partial().unwrap(), &b"next"[..]);
        assert_eq!(lines.scanned, 0);
    }
}
