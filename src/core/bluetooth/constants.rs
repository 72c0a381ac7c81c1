//! Constants used throughout the application
//! This module contains the well-known Nordic UART Service UUIDs,
//! timeouts, and other configuration values.

use std::time::Duration;
use uuid::Uuid;

/// The UUID of the Nordic UART Service
pub const UUID_NUS_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// The UUID of the NUS characteristic the host writes to (NUS "RX", our TX role)
pub const UUID_NUS_WRITE_CHAR: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// The UUID of the NUS characteristic the device notifies on (NUS "TX", our RX role)
pub const UUID_NUS_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Line delimiter for inbound reassembly (LF)
pub const LINE_DELIMITER: u8 = 0x0A;

/// Quiet period after the last chunk before undelimited bytes are flushed
pub const RX_IDLE_FLUSH: Duration = Duration::from_millis(300);

/// Delay between connection retries in milliseconds
pub const CONNECT_RETRY_DELAY_MS: u64 = 1000;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 5;

/// Extra time granted to a scan beyond its own time box before it is abandoned
pub const SCAN_GRACE: Duration = Duration::from_secs(2);

/// Extra time granted to a connect so the transport can clean up after its
/// own timeout before the session gives up on it
pub const CONNECT_GRACE: Duration = Duration::from_secs(2);

/// Default link attempts per connect
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 1;

/// Interval at which the console checks that the link is still up
pub const LINK_CHECK_INTERVAL_SECS: u64 = 2;

/// Name shown for devices that do not advertise one
pub const UNNAMED_DEVICE: &str = "(no name)";
