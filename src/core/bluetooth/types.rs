//! Defines shared data structures for the Bluetooth module.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::classifier::RoleMapping;

/// Represents a discovered Bluetooth device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// The advertised name of the device, or a placeholder
    pub name: String,
    /// Unique transport identifier (MAC address where the platform exposes one)
    pub address: String,
    /// The signal strength (RSSI) of the device, if reported
    pub signal_strength: Option<i16>,
}

impl DiscoveredDevice {
    /// Creates a new DiscoveredDevice instance
    pub fn new(name: impl Into<String>, address: impl Into<String>, signal_strength: Option<i16>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            signal_strength,
        }
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal_strength {
            Some(rssi) => write!(f, "{}  |  {}  |  RSSI: {}", self.name, self.address, rssi),
            None => write!(f, "{}  |  {}  |  RSSI: None", self.name, self.address),
        }
    }
}

/// The GATT operations a characteristic supports that matter to the console
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub notify: bool,
    pub indicate: bool,
    pub write: bool,
    pub write_without_response: bool,
}

impl Capabilities {
    /// Usable as the RX role (device -> host)
    pub fn is_rx_capable(&self) -> bool {
        self.notify || self.indicate
    }

    /// Usable as the TX role (host -> device)
    pub fn is_tx_capable(&self) -> bool {
        self.write || self.write_without_response
    }

    pub fn supports(&self, mode: WriteMode) -> bool {
        match mode {
            WriteMode::WithResponse => self.write,
            WriteMode::WithoutResponse => self.write_without_response,
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.notify, "notify"),
            (self.indicate, "indicate"),
            (self.write, "write"),
            (self.write_without_response, "write-without-response"),
        ];
        let joined: Vec<&str> = names
            .iter()
            .filter(|(present, _)| *present)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", joined.join("|"))
    }
}

/// One characteristic out of a service enumeration snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub service_id: Uuid,
    pub characteristic_id: Uuid,
    pub capabilities: Capabilities,
}

impl CharacteristicDescriptor {
    pub fn new(service_id: Uuid, characteristic_id: Uuid, capabilities: Capabilities) -> Self {
        Self {
            service_id,
            characteristic_id,
            capabilities,
        }
    }
}

impl fmt::Display for CharacteristicDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  [{}]", self.characteristic_id, self.capabilities)
    }
}

/// Acknowledged or unacknowledged GATT write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    WithResponse,
    WithoutResponse,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WithResponse => write!(f, "write-with-response"),
            Self::WithoutResponse => write!(f, "write-without-response"),
        }
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "with_response" | "write_with_response" | "ack" => Ok(Self::WithResponse),
            "without_response" | "write_without_response" | "wwr" => Ok(Self::WithoutResponse),
            other => Err(format!("unknown write mode: {}", other)),
        }
    }
}

/// Lifecycle states of the console session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    Subscribing,
    Ready,
    Disconnecting,
}

impl SessionState {
    /// States in which the session holds a live link
    pub fn has_link(&self) -> bool {
        matches!(self, Self::Connected | Self::Subscribing | Self::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Snapshot of the session after a connect attempt that reached the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub address: String,
    pub state: SessionState,
    pub roles: RoleMapping,
    pub rx_subscribed: bool,
}
