//! Core functionality for the NUS console
//! BLE session handling plus the inbound and outbound data paths.

pub mod bluetooth;
pub mod payload;
pub mod reassembler;

// Re-export commonly used types
pub use bluetooth::{Session, Transport};
pub use payload::{Encoding, LineEnding};
pub use reassembler::{LineReassembler, NotificationSender};
