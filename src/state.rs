//! Application state management
//! This module defines the state shared between the console input loop and
//! the command worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use tokio::sync::Mutex;

use crate::config::ConsoleConfig;
use crate::console::LogSink;
use crate::core::bluetooth::{Interrupt, RX_IDLE_FLUSH, Session, Transport};
use crate::core::reassembler::{rx_channel, spawn_reassembler};

/// Global application state
pub struct AppState<T: Transport> {
    /// The one session; operations queue behind this lock
    pub session: Arc<Mutex<Session<T>>>,
    /// Reaches an in-flight connect without taking the lock
    interrupt: Interrupt,
    /// Set while a link check sits in the command queue
    link_check_pending: Arc<AtomicBool>,
    pub config: Arc<Mutex<ConsoleConfig>>,
    pub config_path: Option<PathBuf>,
    pub sink: Arc<dyn LogSink>,
}

impl<T: Transport> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            interrupt: self.interrupt.clone(),
            link_check_pending: self.link_check_pending.clone(),
            config: self.config.clone(),
            config_path: self.config_path.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<T: Transport> AppState<T> {
    /// Creates the session and starts the reassembler task that owns the
    /// inbound buffer. Must be called inside a tokio runtime.
    pub fn new(
        transport: T,
        config: ConsoleConfig,
        config_path: Option<PathBuf>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let (notifications, events) = rx_channel();
        spawn_reassembler(events, sink.clone(), RX_IDLE_FLUSH);
        sink.set_timestamps(config.timestamps);

        let session = Session::new(transport, config.session_settings(), sink.clone(), notifications);
        let interrupt = session.interrupt();
        info!("Session initialized");

        Self {
            session: Arc::new(Mutex::new(session)),
            interrupt,
            link_check_pending: Arc::new(AtomicBool::new(false)),
            config: Arc::new(Mutex::new(config)),
            config_path,
            sink,
        }
    }

    /// Abandons any in-flight connect or service discovery. The session
    /// notices once the pending transport call returns.
    pub fn interrupt(&self) {
        self.interrupt.cancel();
    }

    /// Returns `true` when the caller should queue a link check, `false`
    /// while one is already waiting to run.
    pub fn request_link_check(&self) -> bool {
        !self.link_check_pending.swap(true, Ordering::SeqCst)
    }

    /// Called by whoever runs the queued check
    pub fn link_check_started(&self) {
        self.link_check_pending.store(false, Ordering::SeqCst);
    }

    /// Interrupts whatever is in flight, then tears the link down
    pub async fn disconnect(&self) {
        self.interrupt();
        self.session.lock().await.disconnect().await;
    }
}
