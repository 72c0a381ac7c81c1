//! The connection lifecycle state machine
//!
//! `Session` is the only owner of the transport handle. Every operation
//! takes `&mut self`, so at most one transition is ever in flight for a given
//! session; callers that share a session across tasks wrap it in a
//! `tokio::sync::Mutex` and queue behind it (see `AppState`).
//!
//! Failures are reported to the sink as status records and returned as
//! typed errors. None of them leave a handle behind: any path that gives up
//! the link goes through `teardown`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::console::{ConsoleRecord, LogSink};
use crate::core::bluetooth::classifier::{Classification, RoleMapping};
use crate::core::bluetooth::constants::{
    CONNECT_GRACE, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_SCAN_DURATION_SECS, SCAN_GRACE,
};
use crate::core::bluetooth::error::{ConnectError, ScanError, SendError, ServiceError, SubscribeError};
use crate::core::bluetooth::transport::Transport;
use crate::core::bluetooth::types::{
    CharacteristicDescriptor, DiscoveredDevice, SessionInfo, SessionState, WriteMode,
};
use crate::core::reassembler::NotificationSender;

/// Knobs the session reads while running operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
    /// Link attempts the transport makes within `connect_timeout`
    pub connect_attempts: u32,
    pub auto_subscribe: bool,
    /// Devices advertising this name are listed first
    pub preferred_name: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(DEFAULT_SCAN_DURATION_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            auto_subscribe: true,
            preferred_name: None,
        }
    }
}

/// Lets another task abandon whatever connect or service discovery is in
/// flight, without waiting for the session lock.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    epoch: Arc<AtomicU64>,
}

impl Interrupt {
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn current(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn cancelled_since(&self, epoch: u64) -> bool {
        self.current() != epoch
    }
}

#[derive(Clone, Copy)]
enum Role {
    Rx,
    Tx,
}

/// Everything that only exists while a link is up
struct Link<H> {
    handle: H,
    address: String,
    classification: Classification,
    roles: RoleMapping,
    subscribed: Option<Uuid>,
}

pub struct Session<T: Transport> {
    transport: T,
    settings: SessionSettings,
    sink: Arc<dyn LogSink>,
    notifications: NotificationSender,
    interrupt: Interrupt,
    state: SessionState,
    link: Option<Link<T::Handle>>,
    devices: Vec<DiscoveredDevice>,
}

impl<T: Transport> Session<T> {
    pub fn new(
        transport: T,
        settings: SessionSettings,
        sink: Arc<dyn LogSink>,
        notifications: NotificationSender,
    ) -> Self {
        Self {
            transport,
            settings,
            sink,
            notifications,
            interrupt: Interrupt::default(),
            state: SessionState::Idle,
            link: None,
            devices: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SessionSettings {
        &mut self.settings
    }

    /// Devices from the most recent scan
    pub fn devices(&self) -> &[DiscoveredDevice] {
        &self.devices
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn has_handle(&self) -> bool {
        self.link.is_some()
    }

    pub fn roles(&self) -> RoleMapping {
        self.link.as_ref().map(|link| link.roles).unwrap_or_default()
    }

    /// Role candidates from the last service enumeration
    pub fn classification(&self) -> Option<&Classification> {
        self.link.as_ref().map(|link| &link.classification)
    }

    pub fn subscribed(&self) -> Option<Uuid> {
        self.link.as_ref().and_then(|link| link.subscribed)
    }

    pub fn info(&self) -> Option<SessionInfo> {
        self.link.as_ref().map(|link| SessionInfo {
            address: link.address.clone(),
            state: self.state,
            roles: link.roles,
            rx_subscribed: link.subscribed.is_some(),
        })
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session state {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn report(&self, text: impl Into<String>) {
        self.sink.record(ConsoleRecord::status(text));
    }

    /// Scans for devices. Only allowed from `Idle`; the previous result set
    /// is replaced, never merged.
    pub async fn scan(&mut self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, ScanError> {
        if self.state != SessionState::Idle {
            let err = ScanError::SessionActive(self.state);
            self.report(format!("Scan failed: {}", err));
            return Err(err);
        }

        self.set_state(SessionState::Scanning);
        self.devices.clear();
        self.report("Scanning...");

        let result = match tokio::time::timeout(timeout + SCAN_GRACE, self.transport.discover(timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::Timeout(timeout)),
        };
        self.set_state(SessionState::Idle);

        match result {
            Ok(mut found) => {
                order_by_preference(&mut found, self.settings.preferred_name.as_deref());
                if found.is_empty() {
                    self.report("No devices found.");
                } else {
                    self.report(format!("Discovered {} device(s).", found.len()));
                }
                self.devices = found.clone();
                Ok(found)
            }
            Err(e) => {
                self.report(format!("Scan failed: {}", e));
                Err(e)
            }
        }
    }

    /// Connects to `address`, tearing down any existing link first, then
    /// enumerates services and (optionally) subscribes RX.
    ///
    /// Service or subscribe failures do not fail the connect; the returned
    /// info says how far the session got.
    pub async fn connect(&mut self, address: &str) -> Result<SessionInfo, ConnectError> {
        let epoch = self.interrupt.current();

        if self.link.is_some() || self.state != SessionState::Idle {
            self.teardown().await;
        }

        self.set_state(SessionState::Connecting);
        self.report(format!("Connecting to {} ...", address));

        // The transport enforces `timeout` itself and cleans up after an
        // abandoned attempt; the outer bound only catches a transport that hangs.
        let timeout = self.settings.connect_timeout;
        let attempts = self.settings.connect_attempts;
        let connecting = self.transport.connect(address, timeout, attempts);
        let handle = match tokio::time::timeout(timeout + CONNECT_GRACE, connecting).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(self.fail_connect(e)),
            Err(_) => return Err(self.fail_connect(ConnectError::Timeout(timeout))),
        };

        if self.interrupt.cancelled_since(epoch) {
            self.release(&handle).await;
            return Err(self.fail_connect(ConnectError::Cancelled));
        }

        if !self.transport.is_connected(&handle).await {
            self.release(&handle).await;
            return Err(self.fail_connect(ConnectError::Incomplete));
        }

        self.link = Some(Link {
            handle,
            address: address.to_string(),
            classification: Classification::default(),
            roles: RoleMapping::default(),
            subscribed: None,
        });
        self.set_state(SessionState::Connected);
        info!("Connected to {}", address);
        self.report(format!("Connected to {}.", address));

        if let Err(e) = self.discover_and_subscribe(epoch).await {
            debug!("Connected without a role mapping: {}", e);
            if e == ServiceError::Cancelled {
                return Err(ConnectError::Cancelled);
            }
        }

        self.info().ok_or(ConnectError::Cancelled)
    }

    fn fail_connect(&mut self, err: ConnectError) -> ConnectError {
        warn!("Connection failed: {}", err);
        self.set_state(SessionState::Idle);
        self.report(format!("Connection failed: {}", err));
        err
    }

    async fn release(&self, handle: &T::Handle) {
        if let Err(e) = self.transport.disconnect(handle).await {
            warn!("Failed to release link: {}", e);
        }
    }

    /// Re-enumerates services, re-runs role selection and re-subscribes.
    /// A manual role selection made earlier is not kept.
    pub async fn refresh_services_and_subscribe(&mut self) -> Result<RoleMapping, ServiceError> {
        let epoch = self.interrupt.current();
        self.discover_and_subscribe(epoch).await
    }

    async fn discover_and_subscribe(&mut self, epoch: u64) -> Result<RoleMapping, ServiceError> {
        if self.link.is_none() || !self.state.has_link() {
            self.report("Not connected.");
            return Err(ServiceError::NotConnected);
        }

        self.unsubscribe_current().await;
        if let Some(link) = self.link.as_mut() {
            link.classification = Classification::default();
            link.roles = RoleMapping::default();
        }
        self.set_state(SessionState::Subscribing);

        let listed = match &self.link {
            Some(link) => self.transport.list_services(&link.handle).await,
            None => Err(ServiceError::NotConnected),
        };

        if self.interrupt.cancelled_since(epoch) {
            self.teardown().await;
            self.report("Disconnected.");
            return Err(ServiceError::Cancelled);
        }

        let snapshot = match listed {
            Ok(snapshot) if !snapshot.is_empty() => snapshot,
            Ok(_) => return Err(self.fail_discovery(ServiceError::NoServices)),
            Err(e) => return Err(self.fail_discovery(e)),
        };
        debug!("Service snapshot has {} characteristics", snapshot.len());

        let classification = Classification::classify(&snapshot);
        let roles = classification.select();
        if let Some(link) = self.link.as_mut() {
            link.classification = classification;
            link.roles = roles;
        }
        self.report_roles(&roles);

        if self.settings.auto_subscribe {
            let _ = self.subscribe().await;
        }
        self.set_state(SessionState::Ready);
        Ok(roles)
    }

    fn fail_discovery(&mut self, err: ServiceError) -> ServiceError {
        warn!("{}", err);
        self.set_state(SessionState::Connected);
        self.report(err.to_string());
        err
    }

    fn report_roles(&self, roles: &RoleMapping) {
        match roles.rx() {
            Some(rx) => self.report(format!("RX (notify): {}", rx)),
            None => self.report("RX (notify): none available"),
        }
        match roles.tx() {
            Some(tx) => self.report(format!("TX (write): {}", tx)),
            None => self.report("TX (write): none available"),
        }
    }

    async fn unsubscribe_current(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if let Some(id) = link.subscribed.take() {
            if let Err(e) = self.transport.unsubscribe(&link.handle, id).await {
                warn!("Failed to unsubscribe from {}: {}", id, e);
            }
        }
    }

    /// Subscribes the selected RX characteristic
    pub async fn subscribe(&mut self) -> Result<Uuid, SubscribeError> {
        let rx = match &self.link {
            Some(link) if self.state.has_link() => link.roles.rx().copied(),
            _ => {
                self.report("Not connected.");
                return Err(SubscribeError::NotConnected);
            }
        };
        let Some(rx) = rx else {
            let err = SubscribeError::NoRxCharacteristic;
            self.report(format!("Subscribe failed: {}", err));
            return Err(err);
        };

        if self.subscribed() == Some(rx.characteristic_id) {
            return Ok(rx.characteristic_id);
        }
        self.unsubscribe_current().await;

        let result = match &self.link {
            Some(link) => {
                self.transport
                    .subscribe(&link.handle, rx.characteristic_id, self.notifications.clone())
                    .await
            }
            None => Err(SubscribeError::NotConnected),
        };

        match result {
            Ok(()) => {
                if let Some(link) = self.link.as_mut() {
                    link.subscribed = Some(rx.characteristic_id);
                }
                self.report(format!("Subscribed RX to {}.", rx.characteristic_id));
                Ok(rx.characteristic_id)
            }
            Err(e) => {
                warn!("Subscribe to {} failed: {}", rx.characteristic_id, e);
                self.report(format!("Subscribe failed: {}", e));
                Err(e)
            }
        }
    }

    /// Picks RX candidate `index` from the last enumeration
    pub async fn select_rx(&mut self, index: usize) -> Result<RoleMapping, ServiceError> {
        let descriptor = self.candidate(index, Role::Rx)?;
        let roles = self.roles().with_rx(descriptor)?;
        self.apply_roles(roles);
        self.report(format!("RX (notify): {}", descriptor));

        if self.subscribed().is_some() || self.settings.auto_subscribe {
            let _ = self.subscribe().await;
        }
        Ok(roles)
    }

    /// Picks TX candidate `index` from the last enumeration
    pub fn select_tx(&mut self, index: usize) -> Result<RoleMapping, ServiceError> {
        let descriptor = self.candidate(index, Role::Tx)?;
        let roles = self.roles().with_tx(descriptor)?;
        self.apply_roles(roles);
        self.report(format!("TX (write): {}", descriptor));
        Ok(roles)
    }

    fn candidate(&self, index: usize, role: Role) -> Result<CharacteristicDescriptor, ServiceError> {
        let classification = match &self.link {
            Some(link) if self.state.has_link() => &link.classification,
            _ => return Err(ServiceError::NotConnected),
        };
        let candidates = match role {
            Role::Rx => &classification.rx_candidates,
            Role::Tx => &classification.tx_candidates,
        };
        candidates
            .get(index)
            .copied()
            .ok_or(ServiceError::NoSuchCandidate(index))
    }

    fn apply_roles(&mut self, roles: RoleMapping) {
        if let Some(link) = self.link.as_mut() {
            link.roles = roles;
        }
    }

    /// Writes `payload` to the TX characteristic.
    ///
    /// A failed write is followed by a link check; if the link is gone the
    /// session is torn down and the error is reported as `LinkLost`.
    pub async fn send(&mut self, payload: &[u8], mode: WriteMode) -> Result<(), SendError> {
        let tx = match &self.link {
            Some(link) if self.state.has_link() => link.roles.tx().copied(),
            _ => {
                self.report("Not connected.");
                return Err(SendError::NotConnected);
            }
        };
        let Some(tx) = tx else {
            self.report("TX characteristic not selected.");
            return Err(SendError::NoTxCharacteristic);
        };
        if !tx.capabilities.supports(mode) {
            warn!("{} does not advertise {}, writing anyway", tx.characteristic_id, mode);
        }

        let (result, link_up) = match &self.link {
            Some(link) => {
                let result = self
                    .transport
                    .write(&link.handle, tx.characteristic_id, payload, mode)
                    .await;
                let link_up = result.is_ok() || self.transport.is_connected(&link.handle).await;
                (result, link_up)
            }
            None => return Err(SendError::NotConnected),
        };

        match result {
            Ok(()) => {
                self.sink.record(ConsoleRecord::Outbound {
                    mode,
                    characteristic: tx.characteristic_id,
                    payload: payload.to_vec(),
                });
                Ok(())
            }
            Err(e) if !link_up => {
                self.report(format!("Send failed: {}", e));
                self.report("Link lost.");
                self.teardown().await;
                Err(SendError::LinkLost(e))
            }
            Err(e) => {
                self.report(format!("Send failed: {}", e));
                Err(SendError::Write(e))
            }
        }
    }

    /// Returns `false` (after tearing down) when the link has dropped
    pub async fn check_link(&mut self) -> bool {
        let up = match &self.link {
            Some(link) => self.transport.is_connected(&link.handle).await,
            None => return false,
        };
        if !up && self.state.has_link() {
            warn!("Link to device lost");
            self.report("Link lost.");
            self.teardown().await;
        }
        up
    }

    /// Always leaves the session `Idle`. Safe to call from any state and
    /// any number of times; transport errors are reported, never returned.
    pub async fn disconnect(&mut self) {
        self.teardown().await;
        self.report("Disconnected.");
    }

    async fn teardown(&mut self) {
        if let Some(link) = self.link.take() {
            self.set_state(SessionState::Disconnecting);
            if let Some(id) = link.subscribed {
                if let Err(e) = self.transport.unsubscribe(&link.handle, id).await {
                    debug!("Unsubscribe during teardown failed: {}", e);
                }
            }
            info!("Disconnecting from {}", link.address);
            if let Err(e) = self.transport.disconnect(&link.handle).await {
                warn!("Disconnect error: {}", e);
                self.report(format!("Disconnect error: {}", e));
            }
        }
        self.notifications.reset();
        self.set_state(SessionState::Idle);
    }
}

/// Preferred name first, then by name; otherwise discovery order is kept
pub fn order_by_preference(devices: &mut [DiscoveredDevice], preferred: Option<&str>) {
    devices.sort_by(|a, b| {
        let rank = |d: &DiscoveredDevice| match preferred {
            Some(name) if d.name.trim() == name => 0,
            _ => 1,
        };
        rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
    });
}
