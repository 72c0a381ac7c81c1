//! The BLE capability the session drives.
//! The session never touches a concrete stack; `BluestTransport` is the
//! production implementation and tests script their own.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::error::{
    ConnectError, DisconnectError, ScanError, ServiceError, SubscribeError, WriteError,
};
use crate::core::bluetooth::types::{CharacteristicDescriptor, DiscoveredDevice, WriteMode};
use crate::core::reassembler::NotificationSender;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opaque link handle, owned exclusively by the session
    type Handle: Send + Sync + 'static;

    /// Scans for up to `timeout` and returns what was seen
    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, ScanError>;

    /// Makes up to `attempts` link attempts within `timeout`. An attempt that
    /// is abandoned must not leave a link open behind the caller's back.
    async fn connect(&self, address: &str, timeout: Duration, attempts: u32) -> Result<Self::Handle, ConnectError>;

    /// Best-effort; the session logs failures and moves on
    async fn disconnect(&self, handle: &Self::Handle) -> Result<(), DisconnectError>;

    /// Flattened `(service, characteristic, capabilities)` list in discovery order
    async fn list_services(&self, handle: &Self::Handle) -> Result<Vec<CharacteristicDescriptor>, ServiceError>;

    /// Registers for notifications; every payload is pushed into `notifications`
    async fn subscribe(
        &self,
        handle: &Self::Handle,
        characteristic_id: Uuid,
        notifications: NotificationSender,
    ) -> Result<(), SubscribeError>;

    async fn unsubscribe(&self, handle: &Self::Handle, characteristic_id: Uuid) -> Result<(), SubscribeError>;

    async fn write(
        &self,
        handle: &Self::Handle,
        characteristic_id: Uuid,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), WriteError>;

    async fn is_connected(&self, handle: &Self::Handle) -> bool;
}
