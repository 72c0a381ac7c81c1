//! Bluetooth functionality for the NUS console
//! This module handles scanning, connecting, mapping characteristics onto
//! RX/TX roles, and the session state machine that drives them.

mod classifier;
mod connection;
mod constants;
mod error;
mod manager;
mod notification;
mod scanner;
mod session;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use classifier::{Classification, RoleMapping};
pub use connection::ConnectionManager;
pub use constants::*; // Re-export all constants
pub use error::{ConnectError, DisconnectError, ScanError, SendError, ServiceError, SubscribeError, WriteError};
pub use manager::{BluestLink, BluestTransport};
pub use notification::NotificationHandler;
pub use scanner::BluetoothScanner;
pub use session::{Interrupt, Session, SessionSettings, order_by_preference};
pub use transport::Transport;
pub use types::{Capabilities, CharacteristicDescriptor, DiscoveredDevice, SessionInfo, SessionState, WriteMode};
