//! Console/log sink: the ordered stream of user-visible records.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Local;
use uuid::Uuid;

use crate::core::bluetooth::WriteMode;

/// A user-visible record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleRecord {
    /// Lifecycle or failure report
    Status(String),
    /// A delimited line from the device
    Line { sender: String, text: String },
    /// Undelimited bytes flushed after the idle window
    Chunk(String),
    /// A payload written to the device
    Outbound {
        mode: WriteMode,
        characteristic: Uuid,
        payload: Vec<u8>,
    },
}

impl ConsoleRecord {
    pub fn status(text: impl Into<String>) -> Self {
        Self::Status(text.into())
    }
}

impl fmt::Display for ConsoleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(text) => write!(f, "{}", text),
            Self::Line { sender, text } => write!(f, "RX({}) line: {}", sender, text),
            Self::Chunk(text) => write!(f, "RX chunk: {}", text),
            Self::Outbound {
                mode,
                characteristic,
                payload,
            } => write!(
                f,
                "TX [{}] -> {}: {}",
                mode,
                characteristic,
                String::from_utf8_lossy(payload).escape_debug()
            ),
        }
    }
}

pub trait LogSink: Send + Sync {
    fn record(&self, record: ConsoleRecord);

    /// Sinks that render timestamps override this
    fn set_timestamps(&self, _enabled: bool) {}
}

/// Prints records to stdout, optionally prefixed with a local timestamp
pub struct StdoutSink {
    timestamps: AtomicBool,
}

impl StdoutSink {
    pub fn new(timestamps: bool) -> Self {
        Self {
            timestamps: AtomicBool::new(timestamps),
        }
    }

    fn prefix(&self) -> String {
        if self.timestamps.load(Ordering::Relaxed) {
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f ").to_string()
        } else {
            String::new()
        }
    }
}

impl LogSink for StdoutSink {
    fn record(&self, record: ConsoleRecord) {
        println!("{}{}", self.prefix(), record);
    }

    fn set_timestamps(&self, enabled: bool) {
        self.timestamps.store(enabled, Ordering::Relaxed);
    }
}

/// Keeps every record in memory
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<ConsoleRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ConsoleRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.records.lock() {
            Ok(mut records) => records.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl LogSink for MemorySink {
    fn record(&self, record: ConsoleRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
