//! Time-boxed device discovery over bluest.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, info};
use regex::Regex;
use tokio::sync::Mutex;

use crate::core::bluetooth::constants::UNNAMED_DEVICE;
use crate::core::bluetooth::error::ScanError;
use crate::core::bluetooth::types::DiscoveredDevice;

pub struct BluetoothScanner {
    adapter: Adapter,
    /// Devices from the last scan, keyed by address, for `connect` to open
    devices: Arc<Mutex<HashMap<String, Device>>>,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, devices: Arc<Mutex<HashMap<String, Device>>>) -> Self {
        Self { adapter, devices }
    }

    /// Scans until `timeout` elapses or the stream ends, returning every
    /// device seen. Devices the system already holds a link to are listed
    /// first since they do not advertise.
    pub async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, ScanError> {
        self.devices.lock().await.clear();
        if !self.adapter.is_available().await.unwrap_or(false) {
            return Err(ScanError::AdapterUnavailable);
        }
        let mut found = ScanResults::default();

        match self.adapter.connected_devices().await {
            Ok(connected) => {
                for device in connected {
                    let name = device.name().ok();
                    let rssi = device.rssi().await.ok();
                    found.insert(device, name, rssi);
                }
            }
            Err(e) => debug!("Could not list connected devices: {}", e),
        }

        info!("Starting bluetooth scan for {:?}", timeout);
        let mut scan_stream = self
            .adapter
            .scan(&[])
            .await
            .map_err(|e| ScanError::Transport(e.to_string()))?;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            debug!("Found device - Device: {:?}, RSSI: {:?}", discovered.device, discovered.rssi);
                            let name = discovered
                                .adv_data
                                .local_name
                                .clone()
                                .or_else(|| discovered.device.name().ok());
                            found.insert(discovered.device, name, discovered.rssi);
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = &mut deadline => {
                    debug!("Scan window elapsed");
                    break;
                }
            }
        }

        let (listed, handles) = found.finish();
        *self.devices.lock().await = handles;
        info!("Scan finished with {} device(s)", listed.len());
        Ok(listed)
    }

    /// Pulls a MAC address out of a platform device id, when there is one
    pub fn extract_mac_address(device_id_str: &str) -> Option<String> {
        static MAC: OnceLock<Option<Regex>> = OnceLock::new();
        let re = MAC
            .get_or_init(|| Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok())
            .as_ref()?;
        re.find_iter(device_id_str)
            .last()
            .map(|m| m.as_str().to_uppercase())
    }
}

/// Deduplicates by address while keeping first-seen order
#[derive(Default)]
struct ScanResults {
    listed: Vec<DiscoveredDevice>,
    index: HashMap<String, usize>,
    handles: HashMap<String, Device>,
}

impl ScanResults {
    fn insert(&mut self, device: Device, name: Option<String>, rssi: Option<i16>) {
        let id = device.id().to_string();
        let address = BluetoothScanner::extract_mac_address(&id).unwrap_or(id);

        match self.index.get(&address) {
            Some(&i) => {
                let entry = &mut self.listed[i];
                if rssi.is_some() {
                    entry.signal_strength = rssi;
                }
                if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
                    entry.name = name;
                }
            }
            None => {
                let name = name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| UNNAMED_DEVICE.to_string());
                self.index.insert(address.clone(), self.listed.len());
                self.listed.push(DiscoveredDevice::new(name, address.clone(), rssi));
                self.handles.insert(address, device);
            }
        }
    }

    fn finish(self) -> (Vec<DiscoveredDevice>, HashMap<String, Device>) {
        (self.listed, self.handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mac_address() {
        assert_eq!(
            BluetoothScanner::extract_mac_address("BluetoothLE#BluetoothLEe4:aa:ea:01:02:03-d8:3a:dd:8f:11:2c"),
            Some("D8:3A:DD:8F:11:2C".to_string())
        );
        assert_eq!(
            BluetoothScanner::extract_mac_address("/org/bluez/hci0/dev_D8-3A-DD-8F-11-2C"),
            Some("D8-3A-DD-8F-11-2C".to_string())
        );
        assert_eq!(
            BluetoothScanner::extract_mac_address("8B1C5D0E-7A4C-4F12-9C55-0A6E1B2C3D4E"),
            None
        );
    }
}
