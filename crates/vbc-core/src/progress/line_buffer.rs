//! Byte-level line splitting with `\r` redraw semantics.

/// Longest line kept in memory; the rest of an overlong line is dropped.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// A complete line recovered from the output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Terminated by `\n` (or `\r\n`): a finished log line.
    Commit(String),
    /// Terminated by a lone `\r`: replaces the previously displayed line.
    Redraw(String),
}

impl LineEvent {
    pub fn text(&self) -> &str {
        match self {
            LineEvent::Commit(s) | LineEvent::Redraw(s) => s,
        }
    }
}

/// Splits engine output into lines. One per job; it only holds the
/// unterminated tail between reads.
///
/// Splitting happens on the ASCII bytes `\r` and `\n`, which never occur
/// inside a multi-byte UTF-8 sequence, so a character split across two
/// reads is reassembled before decoding.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    pending_cr: bool,
    truncated: bool,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            pending_cr: false,
            truncated: false,
            max_line: max_line.max(1),
        }
    }

    /// Feed the next chunk of output and collect completed lines in order.
    ///
    /// A trailing `\r` is held back until the next byte shows whether it
    /// starts a `\r\n` pair.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<LineEvent> {
        let mut events = Vec::new();
        for &b in bytes {
            if self.pending_cr {
                self.pending_cr = false;
                if b == b'\n' {
                    events.push(LineEvent::Commit(self.take_line()));
                    continue;
                }
                events.push(LineEvent::Redraw(self.take_line()));
            }
            match b {
                b'\r' => self.pending_cr = true,
                b'\n' => events.push(LineEvent::Commit(self.take_line())),
                _ if self.buf.len() < self.max_line => self.buf.push(b),
                _ => self.truncated = true,
            }
        }
        events
    }

    /// Flush at end of stream. A held-back `\r` line is a redraw; any other
    /// unterminated text is committed.
    pub fn finish(&mut self) -> Option<LineEvent> {
        if std::mem::take(&mut self.pending_cr) {
            return Some(LineEvent::Redraw(self.take_line()));
        }
        if self.buf.is_empty() {
            return None;
        }
        Some(LineEvent::Commit(self.take_line()))
    }

    fn take_line(&mut self) -> String {
        let mut bytes = std::mem::take(&mut self.buf);
        if std::mem::take(&mut self.truncated) {
            // Drop a character cut in half by the length cap.
            if let Err(e) = std::str::from_utf8(&bytes) {
                if e.error_len().is_none() {
                    bytes.truncate(e.valid_up_to());
                }
            }
        }
        match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(s: &str) -> LineEvent {
        LineEvent::Commit(s.to_string())
    }

    fn redraw(s: &str) -> LineEvent {
        LineEvent::Redraw(s.to_string())
    }

    #[test]
    fn newline_commits() {
        let mut lb = LineBuffer::new();
        assert_eq!(lb.push(b"first\nsecond\n"), vec![commit("first"), commit("second")]);
        assert_eq!(lb.finish(), None);
    }

    #[test]
    fn carriage_return_redraws() {
        let mut lb = LineBuffer::new();
        let events = lb.push(b"frame=1\rframe=2\rframe=3");
        assert_eq!(events, vec![redraw("frame=1"), redraw("frame=2")]);
        assert_eq!(lb.finish(), Some(commit("frame=3")));
    }

    #[test]
    fn trailing_cr_is_held_until_next_byte() {
        let mut lb = LineBuffer::new();
        assert!(lb.push(b"frame=1\r").is_empty());
        assert_eq!(lb.push(b"frame=2\r"), vec![redraw("frame=1")]);
        assert_eq!(lb.finish(), Some(redraw("frame=2")));
    }

    #[test]
    fn crlf_split_across_reads_is_one_commit() {
        let mut lb = LineBuffer::new();
        assert!(lb.push(b"Stream mapping:\r").is_empty());
        assert_eq!(lb.push(b"\nnext"), vec![commit("Stream mapping:")]);
        assert_eq!(lb.finish(), Some(commit("next")));
    }

    #[test]
    fn multibyte_char_split_across_reads() {
        let text = "Input #0, from 'café.mp4':\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut lb = LineBuffer::new();
        assert!(lb.push(&text[..split]).is_empty());
        assert_eq!(lb.push(&text[split..]), vec![commit("Input #0, from 'café.mp4':")]);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_dropped() {
        let mut lb = LineBuffer::new();
        let events = lb.push(b"bad \xFF byte\n");
        assert_eq!(events, vec![commit("bad \u{FFFD} byte")]);
    }

    #[test]
    fn overlong_line_truncated_on_char_boundary() {
        let mut lb = LineBuffer::with_max_line(5);
        // The 5-byte cap keeps only the first byte of "é".
        let events = lb.push("abcdé\n".as_bytes());
        assert_eq!(events, vec![commit("abcd")]);
        // State resets for the next line.
        assert_eq!(lb.push(b"ok\n"), vec![commit("ok")]);
    }

    #[test]
    fn empty_lines_are_reported() {
        let mut lb = LineBuffer::new();
        assert_eq!(lb.push(b"\n\r\n"), vec![commit(""), commit("")]);
    }
}
