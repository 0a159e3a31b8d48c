use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, MutexGuard, watch};
use uuid::Uuid;

use super::types::ConnectionStatus;
use crate::config::RelayConfig;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Answered keepalives after which the link counts as healthy and both
/// counters start over.
pub const PING_HEALTH_THRESHOLD: u32 = 5;

/// The one outbound connection, shared by the worker and the event path.
pub struct ConnectionState {
    writer: Mutex<Option<BoxedWriter>>,
    status_tx: watch::Sender<ConnectionStatus>,
    retry_count: AtomicU32,
    ping_count: AtomicU32,
    failed: AtomicBool,
    config: RwLock<Option<Arc<RelayConfig>>>,
    connection_id: RwLock<Option<Uuid>>,
}

impl ConnectionState {
    pub fn new() -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Arc::new(Self {
            writer: Mutex::new(None),
            status_tx,
            retry_count: AtomicU32::new(0),
            ping_count: AtomicU32::new(0),
            failed: AtomicBool::new(false),
            config: RwLock::new(None),
            connection_id: RwLock::new(None),
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Moves `from` → `to` atomically. Fails if another party changed the
    /// lifecycle in the meantime.
    pub fn transition(&self, from: ConnectionStatus, to: ConnectionStatus) -> bool {
        self.status_tx.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                false
            }
        })
    }

    /// Drops to `Disconnected` unless already there or `Stopped`.
    pub fn mark_disconnected(&self) -> bool {
        self.status_tx.send_if_modified(|current| {
            if current.has_handle() {
                *current = ConnectionStatus::Disconnected;
                true
            } else {
                false
            }
        })
    }

    /// Enters the terminal state. Returns false if it was already stopped.
    pub fn mark_stopped(&self) -> bool {
        self.status_tx.send_if_modified(|current| {
            if current.is_stopped() {
                false
            } else {
                *current = ConnectionStatus::Stopped;
                true
            }
        })
    }

    pub(crate) async fn writer(&self) -> MutexGuard<'_, Option<BoxedWriter>> {
        self.writer.lock().await
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> u32 {
        self.ping_count.load(Ordering::SeqCst)
    }

    /// Counts one failed connect or session. Returns the new retry count.
    pub fn record_failure(&self) -> u32 {
        self.retry_count.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    /// Counts one answered PING. Returns true when this crossed the health
    /// threshold and both counters were reset.
    pub fn record_ping(&self) -> bool {
        let pings = self.ping_count.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if pings > PING_HEALTH_THRESHOLD {
            self.reset_counters();
            true
        } else {
            false
        }
    }

    pub fn reset_counters(&self) {
        self.retry_count.store(0, Ordering::SeqCst);
        self.ping_count.store(0, Ordering::SeqCst);
    }

    pub(crate) fn flag_failure(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    /// Reads and clears the flag set when a send on the live handle failed.
    pub(crate) fn take_failure(&self) -> bool {
        self.failed.swap(false, Ordering::SeqCst)
    }

    pub fn config(&self) -> Option<Arc<RelayConfig>> {
        self.config.read().ok().and_then(|guard| guard.clone())
    }

    pub(crate) fn set_config(&self, config: Option<Arc<RelayConfig>>) {
        if let Ok(mut guard) = self.config.write() {
            *guard = config;
        }
    }

    pub fn connection_id(&self) -> Option<Uuid> {
        self.connection_id.read().ok().and_then(|guard| *guard)
    }

    pub(crate) fn set_connection_id(&self, id: Option<Uuid>) {
        if let Ok(mut guard) = self.connection_id.write() {
            *guard = id;
        }
    }
}
