//! Output buffering for run logs.
//!
//! This module provides the append-only, bounded sink (`LogBuffer`) that
//! holds a run's combined output, plus text sanitization for display.

use std::collections::VecDeque;

use strip_ansi_escapes::strip;

/// A fixed-capacity ring buffer for storing output lines.
///
/// The buffer is append-only from the caller's perspective; once full, the
/// oldest lines are dropped to make room.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    max_lines: usize,
    lines: VecDeque<String>,
}

impl LogBuffer {
    /// Creates a new `LogBuffer` with the specified maximum capacity.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            lines: VecDeque::with_capacity(max_lines.min(1024)),
        }
    }

    /// Adds a line to the buffer.
    ///
    /// Returns `true` if an old line was dropped to make room.
    pub fn push(&mut self, line: String) -> bool {
        let mut dropped = false;
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            dropped = true;
        }
        dropped
    }

    /// Returns the number of lines currently in the buffer.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns an iterator over the lines in the buffer.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }
}

/// Sanitizes text for display, optionally stripping ANSI escape codes.
///
/// If `strip_ansi` is true, ANSI codes are removed. Invalid UTF-8 sequences
/// are replaced.
pub fn sanitize_text(text: &str, strip_ansi: bool) -> String {
    if !strip_ansi {
        return text.to_string();
    }
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_buffer_drops_oldest() {
        let mut buffer = LogBuffer::new(2);
        assert!(buffer.is_empty());
        buffer.push("a".into());
        buffer.push("b".into());
        let dropped = buffer.push("c".into());
        assert!(dropped);
        let lines = buffer.iter().cloned().collect::<Vec<_>>();
        assert_eq!(lines, vec!["b", "c"]);
    }

    #[test]
    fn sanitize_strips_ansi_when_asked() {
        let colored = "\x1b[32m[INFO]\x1b[0m testing";
        assert_eq!(sanitize_text(colored, true), "[INFO] testing");
        assert_eq!(sanitize_text(colored, false), colored);
    }
}
