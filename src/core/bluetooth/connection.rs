//! Bluetooth connection handling
//! This module handles connecting to and disconnecting from a device and
//! flattening its GATT database into characteristic descriptors.

use std::collections::HashMap;
use std::time::Duration;

use bluest::{Adapter, Characteristic, Device, Uuid};
use log::{debug, info, warn};

use crate::core::bluetooth::error::{ConnectError, DisconnectError, ServiceError};
use crate::core::bluetooth::types::{Capabilities, CharacteristicDescriptor};

/// Connection manager for a single device at a time
#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
    retry_delay: u64,
}

impl ConnectionManager {
    pub fn new(adapter: Adapter, retry_delay: u64) -> Self {
        Self { adapter, retry_delay }
    }

    /// Connect to the device, retrying up to `max_attempts` times in total
    pub async fn connect_with_retry(&self, device: &Device, max_attempts: u32) -> Result<(), ConnectError> {
        let max_attempts = max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.try_connect(device).await {
                Ok(()) => {
                    info!("Successfully connected to device");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempt, e);
                    last_error = Some(e);

                    if attempt < max_attempts {
                        info!("Retrying connection in {} ms...", self.retry_delay);
                        tokio::time::sleep(Duration::from_millis(self.retry_delay)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ConnectError::Rejected(format!("Failed to connect after {} attempts", max_attempts))
        }))
    }

    async fn try_connect(&self, device: &Device) -> Result<(), ConnectError> {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Device details - ID: {}, Name: {:?}", device.id(), name);

        if device.is_connected().await {
            info!("Device {} already connected", device.id());
            return Ok(());
        }

        info!("Initiating connection to {}...", device.id());
        self.adapter
            .connect_device(device)
            .await
            .map_err(|e| ConnectError::Rejected(e.to_string()))
    }

    /// Discovers services and characteristics, in discovery order.
    /// Also returns the characteristic handles keyed by UUID for later use.
    pub async fn enumerate(
        &self,
        device: &Device,
    ) -> Result<(Vec<CharacteristicDescriptor>, HashMap<Uuid, Characteristic>), ServiceError> {
        let services = device
            .discover_services()
            .await
            .map_err(|e| ServiceError::Enumeration(e.to_string()))?;

        let mut descriptors = Vec::new();
        let mut handles = HashMap::new();

        for service in services {
            let service_id = service.uuid();
            debug!("Available service: {}", service_id);

            let characteristics = service
                .discover_characteristics()
                .await
                .map_err(|e| ServiceError::Enumeration(e.to_string()))?;

            for characteristic in characteristics {
                let characteristic_id = characteristic.uuid();
                let capabilities = match characteristic.properties().await {
                    Ok(props) => Capabilities {
                        notify: props.notify,
                        indicate: props.indicate,
                        write: props.write,
                        write_without_response: props.write_without_response,
                    },
                    Err(e) => {
                        warn!("Could not read properties of {}: {}", characteristic_id, e);
                        Capabilities::default()
                    }
                };
                debug!("  characteristic {} [{}]", characteristic_id, capabilities);

                descriptors.push(CharacteristicDescriptor::new(service_id, characteristic_id, capabilities));
                handles.entry(characteristic_id).or_insert(characteristic);
            }
        }

        Ok((descriptors, handles))
    }

    /// Cancels a connect that was given up on. The platform may still be
    /// completing it even though `is_connected` reports false, so the
    /// disconnect is issued unconditionally.
    pub async fn abandon(&self, device: &Device) {
        info!("Abandoning connection to {}", device.id());
        if let Err(e) = self.adapter.disconnect_device(device).await {
            debug!("Cleanup after abandoned connect to {} failed: {}", device.id(), e);
        }
    }

    /// Disconnect from the device
    pub async fn disconnect(&self, device: &Device) -> Result<(), DisconnectError> {
        if device.is_connected().await {
            info!("Disconnecting from device {}", device.id());
            self.adapter
                .disconnect_device(device)
                .await
                .map_err(|e| DisconnectError(e.to_string()))?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", device.id());
        }
        Ok(())
    }
}
