//! Line framing over a raw [`SerialLink`].
//!
//! The firmware speaks newline-terminated ASCII. Bytes that arrive after a
//! terminator stay in `pending` for the next read, so two lines delivered in
//! one OS read are never merged or lost.

use crate::domain::ports::SerialLink;
use crate::utils::error::Result;
use std::time::{Duration, Instant};

const LINE_TERMINATOR: u8 = b'\n';
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of a marker-driven read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerRead {
    /// The first complete line containing one of the markers.
    Matched { line: String, marker: &'static str },
    /// Everything accumulated before the deadline; may be empty.
    TimedOut { partial: String },
}

pub struct FramedLink {
    link: Box<dyn SerialLink>,
    pending: Vec<u8>,
}

impl FramedLink {
    pub fn new(link: Box<dyn SerialLink>) -> Self {
        Self {
            link,
            pending: Vec::new(),
        }
    }

    pub fn port_name(&self) -> &str {
        self.link.port_name()
    }

    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    pub fn close(&mut self) {
        self.pending.clear();
        self.link.close();
    }

    /// Discard unread bytes, both ours and the OS buffer.
    pub fn clear_input(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            tracing::debug!(
                "Discarding {} stale bytes: {:?}",
                self.pending.len(),
                String::from_utf8_lossy(&self.pending)
            );
            self.pending.clear();
        }
        self.link.clear_input()
    }

    /// Write `command` plus terminator and flush.
    pub fn send_line(&mut self, command: &str) -> Result<()> {
        let mut payload = Vec::with_capacity(command.len() + 1);
        payload.extend_from_slice(command.as_bytes());
        payload.push(LINE_TERMINATOR);

        self.link.write_bytes(&payload)?;
        self.link.flush()?;
        tracing::debug!("→ {}", command);
        Ok(())
    }

    /// Block up to `timeout` for the next non-empty line. Carriage returns and
    /// surrounding whitespace are stripped. `Ok(None)` on timeout.
    pub fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(line) = self.take_line() {
                if !line.is_empty() {
                    tracing::debug!("← {}", line);
                    return Ok(Some(line));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            if self.link.read_available(&mut self.pending)? == 0 {
                std::thread::sleep(POLL_INTERVAL.min(deadline - now));
            }
        }
    }

    /// Accumulate lines until one contains any of `markers`, or `timeout` elapses.
    ///
    /// Only complete lines are tested, so a numeric field after a marker is
    /// never cut short by a read boundary.
    pub fn read_until_marker(
        &mut self,
        timeout: Duration,
        markers: &[&'static str],
    ) -> Result<MarkerRead> {
        let deadline = Instant::now() + timeout;
        let mut seen: Vec<String> = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.read_line(remaining)? {
                Some(line) => {
                    if let Some(marker) = markers.iter().find(|m| line.contains(**m)) {
                        return Ok(MarkerRead::Matched {
                            line,
                            marker: *marker,
                        });
                    }
                    seen.push(line);
                }
                None => {
                    let mut partial = seen.join("\n");
                    let tail = String::from_utf8_lossy(&self.pending);
                    let tail = tail.trim();
                    if !tail.is_empty() {
                        if !partial.is_empty() {
                            partial.push('\n');
                        }
                        partial.push_str(tail);
                    }
                    return Ok(MarkerRead::TimedOut { partial });
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == LINE_TERMINATOR)?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let text = String::from_utf8_lossy(&raw[..end]);
        Some(text.replace('\r', "").trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::SensorError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Hands out one queued chunk per read call.
    struct ChunkedLink {
        chunks: VecDeque<Vec<u8>>,
        written: Arc<Mutex<Vec<u8>>>,
        accept_limit: Option<usize>,
        open: bool,
    }

    impl ChunkedLink {
        fn new(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
                written: Arc::new(Mutex::new(Vec::new())),
                accept_limit: None,
                open: true,
            }
        }
    }

    impl SerialLink for ChunkedLink {
        fn port_name(&self) -> &str {
            "TEST"
        }

        fn clear_input(&mut self) -> Result<()> {
            self.chunks.clear();
            Ok(())
        }

        fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
            if let Some(limit) = self.accept_limit {
                return Err(SensorError::WriteError {
                    written: limit,
                    expected: data.len(),
                });
            }
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf.extend_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    fn framed(chunks: &[&str]) -> FramedLink {
        FramedLink::new(Box::new(ChunkedLink::new(chunks)))
    }

    #[test]
    fn test_read_line_joins_split_chunks_and_strips_cr() {
        let mut link = framed(&["PLACE_", "FINGER\r", "\n"]);
        let line = link.read_line(Duration::from_millis(200)).unwrap();
        assert_eq!(line.as_deref(), Some("PLACE_FINGER"));
    }

    #[test]
    fn test_read_line_keeps_second_line_for_next_call() {
        let mut link = framed(&["CAPTURED\nREMOVE_FINGER\n"]);
        assert_eq!(
            link.read_line(Duration::from_millis(100)).unwrap().as_deref(),
            Some("CAPTURED")
        );
        assert_eq!(
            link.read_line(Duration::from_millis(100)).unwrap().as_deref(),
            Some("REMOVE_FINGER")
        );
    }

    #[test]
    fn test_read_line_skips_blank_lines_and_times_out() {
        let mut link = framed(&["\r\n\n"]);
        let start = Instant::now();
        assert_eq!(link.read_line(Duration::from_millis(60)).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_read_until_marker_waits_for_complete_line() {
        let mut link = framed(&["boot banner\nCOUNT:1", "2 templates\n"]);
        let read = link
            .read_until_marker(Duration::from_millis(200), &["COUNT:"])
            .unwrap();
        assert_eq!(
            read,
            MarkerRead::Matched {
                line: "COUNT:12 templates".to_string(),
                marker: "COUNT:",
            }
        );
    }

    #[test]
    fn test_read_until_marker_returns_partial_on_timeout() {
        let mut link = framed(&["noise\nhalf a li"]);
        let read = link
            .read_until_marker(Duration::from_millis(50), &["READY"])
            .unwrap();
        assert_eq!(
            read,
            MarkerRead::TimedOut {
                partial: "noise\nhalf a li".to_string()
            }
        );
    }

    #[test]
    fn test_send_line_appends_terminator() {
        let inner = ChunkedLink::new(&[]);
        let written = inner.written.clone();
        let mut link = FramedLink::new(Box::new(inner));

        link.send_line("ENROLL:7").unwrap();
        assert_eq!(written.lock().unwrap().as_slice(), b"ENROLL:7\n");

        link.close();
        assert!(!link.is_open());
    }

    #[test]
    fn test_send_line_reports_short_write() {
        let mut inner = ChunkedLink::new(&[]);
        inner.accept_limit = Some(2);
        let mut link = FramedLink::new(Box::new(inner));
        assert!(matches!(
            link.send_line("PING"),
            Err(SensorError::WriteError {
                written: 2,
                expected: 5
            })
        ));
    }
}
