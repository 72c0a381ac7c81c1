//! Scripted in-memory transport for driving the session in tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use nus_console_lib::console::{ConsoleRecord, MemorySink};
use nus_console_lib::core::bluetooth::{
    Capabilities, CharacteristicDescriptor, ConnectError, DisconnectError, DiscoveredDevice, ScanError,
    ServiceError, SubscribeError, Transport, UUID_NUS_NOTIFY_CHAR, UUID_NUS_SERVICE, UUID_NUS_WRITE_CHAR,
    WriteError, WriteMode,
};
use nus_console_lib::core::reassembler::NotificationSender;

pub const NOTIFY: Capabilities = Capabilities {
    notify: true,
    indicate: false,
    write: false,
    write_without_response: false,
};

pub const WRITE: Capabilities = Capabilities {
    notify: false,
    indicate: false,
    write: true,
    write_without_response: true,
};

pub const READ_ONLY: Capabilities = Capabilities {
    notify: false,
    indicate: false,
    write: false,
    write_without_response: false,
};

pub fn short_uuid(n: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb | ((n as u128) << 96))
}

/// A vendor service ahead of a full NUS service
pub fn nus_snapshot() -> Vec<CharacteristicDescriptor> {
    vec![
        CharacteristicDescriptor::new(short_uuid(0x1800), short_uuid(0x2a00), READ_ONLY),
        CharacteristicDescriptor::new(short_uuid(0xfe59), short_uuid(0x0001), NOTIFY),
        CharacteristicDescriptor::new(short_uuid(0xfe59), short_uuid(0x0002), WRITE),
        CharacteristicDescriptor::new(UUID_NUS_SERVICE, UUID_NUS_WRITE_CHAR, WRITE),
        CharacteristicDescriptor::new(UUID_NUS_SERVICE, UUID_NUS_NOTIFY_CHAR, NOTIFY),
    ]
}

pub struct MockHandle {
    pub id: u64,
}

#[derive(Default)]
pub struct MockInner {
    pub devices: Mutex<Vec<DiscoveredDevice>>,
    pub scan_error: Mutex<Option<ScanError>>,
    pub connect_delay: Mutex<Duration>,
    pub connect_error: Mutex<Option<ConnectError>>,
    /// When set, a connect slower than its timeout gives up on its own and
    /// cancels the pending link, the way the bluest transport does
    pub enforces_timeout: AtomicBool,
    pub abandoned_connects: AtomicUsize,
    pub last_attempts: AtomicU32,
    /// When false, connect succeeds but the link never reports up
    pub link_comes_up: AtomicBool,
    pub link_up: AtomicBool,
    pub services: Mutex<Option<Result<Vec<CharacteristicDescriptor>, ServiceError>>>,
    pub services_delay: Mutex<Duration>,
    pub subscribe_error: Mutex<Option<SubscribeError>>,
    pub write_error: Mutex<Option<WriteError>>,
    pub disconnect_error: Mutex<Option<DisconnectError>>,
    pub writes: Mutex<Vec<(Uuid, Vec<u8>, WriteMode)>>,
    pub subscribed: Mutex<Vec<Uuid>>,
    pub notifier: Mutex<Option<(Uuid, NotificationSender)>>,
    pub next_handle: AtomicU64,
    pub live_handles: AtomicUsize,
    pub max_live_handles: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
}

#[derive(Clone)]
pub struct MockTransport {
    pub inner: Arc<MockInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        let inner = MockInner::default();
        inner.link_comes_up.store(true, Ordering::SeqCst);
        *inner.services.lock().unwrap() = Some(Ok(nus_snapshot()));
        *inner.devices.lock().unwrap() = vec![
            DiscoveredDevice::new("Thermostat", "AA:AA:AA:AA:AA:01", Some(-70)),
            DiscoveredDevice::new("DeepSleepDongle", "AA:AA:AA:AA:AA:02", Some(-55)),
        ];
        Self { inner: Arc::new(inner) }
    }

    pub fn with_services(self, services: Result<Vec<CharacteristicDescriptor>, ServiceError>) -> Self {
        *self.inner.services.lock().unwrap() = Some(services);
        self
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *self.inner.connect_delay.lock().unwrap() = delay;
        self
    }

    pub fn with_services_delay(self, delay: Duration) -> Self {
        *self.inner.services_delay.lock().unwrap() = delay;
        self
    }

    pub fn enforcing_timeout(self) -> Self {
        self.inner.enforces_timeout.store(true, Ordering::SeqCst);
        self
    }

    pub fn abandoned_connects(&self) -> usize {
        self.inner.abandoned_connects.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.inner.live_handles.load(Ordering::SeqCst)
    }

    pub fn max_live_handles(&self) -> usize {
        self.inner.max_live_handles.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>, WriteMode)> {
        self.inner.writes.lock().unwrap().clone()
    }

    pub fn drop_link(&self) {
        self.inner.link_up.store(false, Ordering::SeqCst);
    }

    /// Delivers a notification as the device would
    pub fn notify(&self, bytes: &[u8]) {
        let notifier = self.inner.notifier.lock().unwrap().clone();
        let (id, sender) = notifier.expect("nothing subscribed");
        sender.push(id.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Handle = MockHandle;

    async fn discover(&self, _timeout: Duration) -> Result<Vec<DiscoveredDevice>, ScanError> {
        if let Some(err) = self.inner.scan_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.inner.devices.lock().unwrap().clone())
    }

    async fn connect(&self, address: &str, timeout: Duration, attempts: u32) -> Result<MockHandle, ConnectError> {
        self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.last_attempts.store(attempts, Ordering::SeqCst);
        let delay = *self.inner.connect_delay.lock().unwrap();
        if self.inner.enforces_timeout.load(Ordering::SeqCst) && delay > timeout {
            tokio::time::sleep(timeout).await;
            self.inner.abandoned_connects.fetch_add(1, Ordering::SeqCst);
            return Err(ConnectError::Timeout(timeout));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.inner.connect_error.lock().unwrap().clone() {
            return Err(err);
        }
        if address.is_empty() {
            return Err(ConnectError::UnknownDevice(address.to_string()));
        }

        let live = self.inner.live_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_live_handles.fetch_max(live, Ordering::SeqCst);
        let up = self.inner.link_comes_up.load(Ordering::SeqCst);
        self.inner.link_up.store(up, Ordering::SeqCst);
        Ok(MockHandle {
            id: self.inner.next_handle.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn disconnect(&self, _handle: &MockHandle) -> Result<(), DisconnectError> {
        self.inner.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.live_handles.fetch_sub(1, Ordering::SeqCst);
        self.inner.link_up.store(false, Ordering::SeqCst);
        self.inner.subscribed.lock().unwrap().clear();
        *self.inner.notifier.lock().unwrap() = None;
        match self.inner.disconnect_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn list_services(&self, _handle: &MockHandle) -> Result<Vec<CharacteristicDescriptor>, ServiceError> {
        let delay = *self.inner.services_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner
            .services
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Err(ServiceError::NoServices))
    }

    async fn subscribe(
        &self,
        _handle: &MockHandle,
        characteristic_id: Uuid,
        notifications: NotificationSender,
    ) -> Result<(), SubscribeError> {
        if let Some(err) = self.inner.subscribe_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.inner.subscribed.lock().unwrap().push(characteristic_id);
        *self.inner.notifier.lock().unwrap() = Some((characteristic_id, notifications));
        Ok(())
    }

    async fn unsubscribe(&self, _handle: &MockHandle, characteristic_id: Uuid) -> Result<(), SubscribeError> {
        self.inner
            .subscribed
            .lock()
            .unwrap()
            .retain(|id| *id != characteristic_id);
        Ok(())
    }

    async fn write(
        &self,
        _handle: &MockHandle,
        characteristic_id: Uuid,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), WriteError> {
        if let Some(err) = self.inner.write_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.inner
            .writes
            .lock()
            .unwrap()
            .push((characteristic_id, payload.to_vec(), mode));
        Ok(())
    }

    async fn is_connected(&self, _handle: &MockHandle) -> bool {
        self.inner.link_up.load(Ordering::SeqCst)
    }
}

pub fn statuses(sink: &MemorySink) -> Vec<String> {
    sink.records()
        .into_iter()
        .filter_map(|r| match r {
            ConsoleRecord::Status(text) => Some(text),
            _ => None,
        })
        .collect()
}
