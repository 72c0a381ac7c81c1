//! Error taxonomy for the console session.
//! Transport failures are converted into these at the transport boundary.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::core::bluetooth::types::SessionState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("No Bluetooth adapter available")]
    AdapterUnavailable,

    #[error("Cannot scan while session is {0}")]
    SessionActive(SessionState),

    #[error("Scan did not finish within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Device not found: {0}")]
    UnknownDevice(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection did not complete")]
    Incomplete,

    #[error("Connection attempt cancelled")]
    Cancelled,

    #[error("{0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Not connected")]
    NotConnected,

    #[error("No services available from device")]
    NoServices,

    #[error("Service discovery cancelled")]
    Cancelled,

    #[error("Characteristic {characteristic} cannot serve as {role}")]
    IncompatibleRole { characteristic: Uuid, role: &'static str },

    #[error("No candidate at index {0}")]
    NoSuchCandidate(usize),

    #[error("Service discovery failed: {0}")]
    Enumeration(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("Not connected")]
    NotConnected,

    #[error("RX characteristic not selected")]
    NoRxCharacteristic,

    #[error("Characteristic not found: {0}")]
    UnknownCharacteristic(Uuid),

    #[error("{0}")]
    Registration(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct WriteError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Not connected")]
    NotConnected,

    #[error("TX characteristic not selected")]
    NoTxCharacteristic,

    #[error("Link lost: {0}")]
    LinkLost(WriteError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DisconnectError(pub String);
