//! Bluetooth manager
//! `BluestTransport` ties the scanner, connection manager and notification
//! handler together behind the `Transport` trait.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use log::{debug, info};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::constants::CONNECT_RETRY_DELAY_MS;
use crate::core::bluetooth::error::{
    ConnectError, DisconnectError, ScanError, ServiceError, SubscribeError, WriteError,
};
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::bluetooth::transport::Transport;
use crate::core::bluetooth::types::{CharacteristicDescriptor, DiscoveredDevice, WriteMode};
use crate::core::reassembler::NotificationSender;

/// A live link as seen by bluest
pub struct BluestLink {
    device: Device,
    /// Filled by `list_services`
    characteristics: Mutex<HashMap<Uuid, Characteristic>>,
    subscriptions: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl BluestLink {
    fn new(device: Device) -> Self {
        Self {
            device,
            characteristics: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    async fn characteristic(&self, id: Uuid) -> Option<Characteristic> {
        self.characteristics.lock().await.get(&id).cloned()
    }

    async fn cancel_subscriptions(&self) {
        for (id, token) in self.subscriptions.lock().await.drain() {
            debug!("Stopping notifications from {}", id);
            token.cancel();
        }
    }
}

pub struct BluestTransport {
    /// Map of device addresses to devices from the last scan
    devices: Arc<Mutex<HashMap<String, Device>>>,
    connection_manager: ConnectionManager,
    scanner: BluetoothScanner,
}

impl BluestTransport {
    /// Opens the default adapter and waits until it is powered on
    pub async fn new() -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        let devices = Arc::new(Mutex::new(HashMap::new()));
        let connection_manager = ConnectionManager::new(adapter.clone(), CONNECT_RETRY_DELAY_MS);
        let scanner = BluetoothScanner::new(adapter, devices.clone());

        Ok(Self {
            devices,
            connection_manager,
            scanner,
        })
    }
}

#[async_trait]
impl Transport for BluestTransport {
    type Handle = BluestLink;

    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, ScanError> {
        self.scanner.discover(timeout).await
    }

    async fn connect(&self, address: &str, timeout: Duration, attempts: u32) -> Result<BluestLink, ConnectError> {
        let device = {
            let devices = self.devices.lock().await;
            devices
                .get(address)
                .cloned()
                .ok_or_else(|| ConnectError::UnknownDevice(address.to_string()))?
        };

        let result = match tokio::time::timeout(timeout, self.connection_manager.connect_with_retry(&device, attempts))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout(timeout)),
        };
        if let Err(e) = result {
            self.connection_manager.abandon(&device).await;
            return Err(e);
        }

        Ok(BluestLink::new(device))
    }

    async fn disconnect(&self, handle: &BluestLink) -> Result<(), DisconnectError> {
        handle.cancel_subscriptions().await;
        handle.characteristics.lock().await.clear();
        self.connection_manager.disconnect(&handle.device).await
    }

    async fn list_services(&self, handle: &BluestLink) -> Result<Vec<CharacteristicDescriptor>, ServiceError> {
        let (descriptors, characteristics) = self.connection_manager.enumerate(&handle.device).await?;
        *handle.characteristics.lock().await = characteristics;
        Ok(descriptors)
    }

    async fn subscribe(
        &self,
        handle: &BluestLink,
        characteristic_id: Uuid,
        notifications: NotificationSender,
    ) -> Result<(), SubscribeError> {
        let notify_char = handle
            .characteristic(characteristic_id)
            .await
            .ok_or(SubscribeError::UnknownCharacteristic(characteristic_id))?;

        let token = CancellationToken::new();
        NotificationHandler::setup_notifications(notify_char, notifications, token.clone()).await?;

        if let Some(previous) = handle.subscriptions.lock().await.insert(characteristic_id, token) {
            previous.cancel();
        }
        Ok(())
    }

    async fn unsubscribe(&self, handle: &BluestLink, characteristic_id: Uuid) -> Result<(), SubscribeError> {
        match handle.subscriptions.lock().await.remove(&characteristic_id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(SubscribeError::UnknownCharacteristic(characteristic_id)),
        }
    }

    async fn write(
        &self,
        handle: &BluestLink,
        characteristic_id: Uuid,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), WriteError> {
        let write_char = handle
            .characteristic(characteristic_id)
            .await
            .ok_or_else(|| WriteError(format!("Characteristic not found: {}", characteristic_id)))?;

        debug!("Writing {} bytes to {} ({})", payload.len(), characteristic_id, mode);
        let result = match mode {
            WriteMode::WithResponse => write_char.write(payload).await,
            WriteMode::WithoutResponse => write_char.write_without_response(payload).await,
        };
        result.map_err(|e| WriteError(e.to_string()))
    }

    async fn is_connected(&self, handle: &BluestLink) -> bool {
        handle.device.is_connected().await
    }
}
