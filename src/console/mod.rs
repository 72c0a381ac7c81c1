//! Where user-visible records end up.

mod sink;

pub use sink::{ConsoleRecord, LogSink, MemorySink, StdoutSink};
