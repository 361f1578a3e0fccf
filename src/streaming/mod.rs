//! SSE (Server-Sent Events) streaming utilities
//!
//! Line and frame buffering for upstream byte streams, plus the relay that
//! drives one upstream stream through a translator to the caller.

pub mod relay;

pub use relay::{pump, EventSink, Relay, RelayOutcome, RelayState, RELAY_CHANNEL_CAPACITY};

use thiserror::Error;

/// Longest line accepted from an upstream before the stream is rejected
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// An upstream line grew past [`MAX_LINE_BYTES`] without a newline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Upstream line exceeds {limit} bytes without a newline")]
pub struct LineTooLong {
    pub limit: usize,
}

/// Buffer for accumulating incomplete lines across chunk boundaries.
///
/// Upstream data arrives as byte chunks that need not align with line or
/// UTF-8 character boundaries, so bytes are held until a `\n` arrives and
/// only complete lines are decoded. A trailing `\r` is stripped.
///
/// # Example
/// ```
/// use claude_proxy::streaming::SseLineBuffer;
///
/// let mut buffer = SseLineBuffer::new();
///
/// let lines = buffer.feed(b"data: {\"content\":\"hel").unwrap();
/// assert!(lines.is_empty());
///
/// let lines = buffer.feed(b"lo\"}\n").unwrap();
/// assert_eq!(lines, vec!["data: {\"content\":\"hello\"}"]);
/// ```
#[derive(Debug)]
pub struct SseLineBuffer {
    incomplete: Vec<u8>,
    max_line: usize,
}

impl Default for SseLineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer that rejects lines longer than `max_line` bytes
    pub fn with_limit(max_line: usize) -> Self {
        Self {
            incomplete: Vec::new(),
            max_line,
        }
    }

    /// Feed bytes into the buffer and return every complete line, empty
    /// lines included (they delimit SSE frames).
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, LineTooLong> {
        self.incomplete.extend_from_slice(bytes);

        let mut complete_lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.incomplete[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let mut line = &self.incomplete[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            complete_lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
        }
        self.incomplete.drain(..start);

        if self.incomplete.len() > self.max_line {
            self.incomplete.clear();
            return Err(LineTooLong {
                limit: self.max_line,
            });
        }

        Ok(complete_lines)
    }

    /// Take whatever is left as a final line (stream closed without a newline)
    pub fn flush(&mut self) -> Option<String> {
        if self.incomplete.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.incomplete);
        let text = String::from_utf8_lossy(&rest);
        Some(text.trim_end_matches('\r').to_string())
    }

    /// Check if there's any incomplete data remaining in the buffer
    pub fn has_incomplete(&self) -> bool {
        !self.incomplete.is_empty()
    }
}

/// One dispatched SSE frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Reassembles SSE frames from arbitrarily split chunks.
///
/// Follows the event-stream grammar: `field: value` lines, comment lines
/// starting with `:`, and a blank line dispatching the frame. Frames with no
/// data are dropped.
#[derive(Debug, Default)]
pub struct SseFrameBuffer {
    lines: SseLineBuffer,
    event: Option<String>,
    data: Vec<String>,
}

impl SseFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every frame completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseFrame>, LineTooLong> {
        let mut frames = Vec::new();
        for line in self.lines.feed(bytes)? {
            self.push_line(&line, &mut frames);
        }
        Ok(frames)
    }

    /// Dispatch a pending frame left by a stream that closed without the
    /// terminating blank line.
    pub fn flush(&mut self) -> Option<SseFrame> {
        let mut frames = Vec::new();
        if let Some(line) = self.lines.flush() {
            self.push_line(&line, &mut frames);
        }
        self.dispatch(&mut frames);
        frames.pop()
    }

    fn push_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        if line.is_empty() {
            self.dispatch(frames);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id / retry carry nothing the gateway needs
            _ => {}
        }
    }

    fn dispatch(&mut self, frames: &mut Vec<SseFrame>) {
        let event = self.event.take();
        if self.data.is_empty() {
            return;
        }
        frames.push(SseFrame {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
        });
    }
}
