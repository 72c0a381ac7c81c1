//! Inbound stream reassembly
//! Notification chunks arrive at whatever size the link MTU dictates. This
//! module turns them into LF-delimited lines and flushes any undelimited tail
//! once the stream has been quiet for the idle window.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::console::{ConsoleRecord, LogSink};
use crate::core::bluetooth::LINE_DELIMITER;

/// Events serialized through the reassembler's queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxEvent {
    Chunk { sender: String, bytes: Vec<u8> },
    /// Drop buffered bytes and disarm the flush timer
    Reset,
}

/// Cloneable hand-off from notification callbacks into the reassembler task
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<RxEvent>,
}

impl NotificationSender {
    pub fn push(&self, sender: impl Into<String>, bytes: Vec<u8>) {
        let event = RxEvent::Chunk {
            sender: sender.into(),
            bytes,
        };
        if self.tx.send(event).is_err() {
            debug!("Reassembler queue closed, dropping notification");
        }
    }

    pub fn reset(&self) {
        let _ = self.tx.send(RxEvent::Reset);
    }
}

/// Creates the queue feeding a reassembler task
pub fn rx_channel() -> (NotificationSender, mpsc::UnboundedReceiver<RxEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSender { tx }, rx)
}

/// Line framing over a growing byte buffer
#[derive(Debug, Default)]
pub struct LineReassembler {
    buffer: Vec<u8>,
}

impl LineReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(idx) = self.buffer.iter().position(|&b| b == LINE_DELIMITER) {
            let line: Vec<u8> = self.buffer.drain(..=idx).collect();
            lines.push(decode_line(&line));
        }
        lines
    }

    /// Drains whatever is buffered, decoding lossily
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(text)
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8]) -> String {
    match std::str::from_utf8(line) {
        Ok(text) => text.trim_end_matches(['\r', '\n']).to_string(),
        Err(_) => {
            warn!("Undecodable line of {} bytes, showing hex", line.len());
            hex_dump(line)
        }
    }
}

/// `[0xff, 0x0a]` -> `"FF 0A"`
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Starts the task that owns the reassembly buffer.
///
/// Chunk appends and idle-timer expiry are handled by the same `select!`
/// loop, so they never interleave. The task ends when every
/// `NotificationSender` has been dropped.
pub fn spawn_reassembler(
    mut events: mpsc::UnboundedReceiver<RxEvent>,
    sink: Arc<dyn LogSink>,
    idle_window: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reassembler = LineReassembler::new();
        let mut flush_at: Option<Instant> = None;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(RxEvent::Chunk { sender, bytes }) => {
                        debug!("RX {} bytes from {}", bytes.len(), sender);
                        for text in reassembler.push(&bytes) {
                            sink.record(ConsoleRecord::Line { sender: sender.clone(), text });
                        }
                        flush_at = Some(Instant::now() + idle_window);
                    }
                    Some(RxEvent::Reset) => {
                        if !reassembler.is_empty() {
                            debug!("Discarding {} buffered bytes", reassembler.len());
                        }
                        reassembler.reset();
                        flush_at = None;
                    }
                    None => break,
                },
                _ = sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    flush_at = None;
                    if let Some(text) = reassembler.flush() {
                        sink.record(ConsoleRecord::Chunk(text));
                    }
                }
            }
        }

        debug!("Reassembler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::MemorySink;
    use crate::core::bluetooth::RX_IDLE_FLUSH;

    #[test]
    fn test_lines_across_chunks() {
        let mut reassembler = LineReassembler::new();
        assert!(reassembler.push(b"ab").is_empty());
        assert_eq!(reassembler.push(b"cd\n"), vec!["abcd"]);
        assert_eq!(reassembler.push(b"ef\n"), vec!["ef"]);
        assert!(reassembler.is_empty());
    }

    #[test]
    fn test_batched_lines_and_crlf() {
        let mut reassembler = LineReassembler::new();
        let lines = reassembler.push(b"one\r\ntwo\nthr");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(reassembler.len(), 3);
        assert_eq!(reassembler.flush().as_deref(), Some("thr"));
        assert_eq!(reassembler.flush(), None);
    }

    #[test]
    fn test_undecodable_line_falls_back_to_hex() {
        let mut reassembler = LineReassembler::new();
        let lines = reassembler.push(&[0xff, 0xfe, b'A', b'\n', b'o', b'k', b'\n']);
        assert_eq!(lines, vec!["FF FE 41 0A", "ok"]);
    }

    #[test]
    fn test_flush_is_lossy() {
        let mut reassembler = LineReassembler::new();
        reassembler.push(&[b'x', 0xff]);
        assert_eq!(reassembler.flush().as_deref(), Some("x\u{FFFD}"));
    }

    fn started() -> (NotificationSender, Arc<MemorySink>, JoinHandle<()>) {
        let sink = Arc::new(MemorySink::new());
        let (sender, events) = rx_channel();
        let task = spawn_reassembler(events, sink.clone(), RX_IDLE_FLUSH);
        (sender, sink, task)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_flush_emits_single_chunk() {
        let (sender, sink, _task) = started();
        sender.push("rx", b"partial".to_vec());

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert!(sink.records().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.records(), vec![ConsoleRecord::Chunk("partial".into())]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_before_idle_window_yields_only_line() {
        let (sender, sink, _task) = started();
        sender.push("rx", b"partial".to_vec());
        tokio::time::sleep(Duration::from_millis(100)).await;
        sender.push("rx", b"more\n".to_vec());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            sink.records(),
            vec![ConsoleRecord::Line {
                sender: "rx".into(),
                text: "partialmore".into()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_traffic_defers_flush() {
        let (sender, sink, _task) = started();
        for _ in 0..10 {
            sender.push("rx", b"x".to_vec());
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(sink.records().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.records(), vec![ConsoleRecord::Chunk("xxxxxxxxxx".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_buffer_and_timer() {
        let (sender, sink, _task) = started();
        sender.push("rx", b"stale".to_vec());
        tokio::time::sleep(Duration::from_millis(10)).await;
        sender.reset();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(sink.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_ends_when_senders_dropped() {
        let (sender, _sink, task) = started();
        drop(sender);
        task.await.unwrap();
    }
}
