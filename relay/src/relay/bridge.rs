use std::sync::Arc;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;

use super::events::{ChatEvent, PlayerRecord};
use super::formatter::OutboundFormatter;
use crate::config::{self, SettingsStore};
use crate::irc::irc_parser::CMD_NICK;
use crate::irc::{BackoffPolicy, ConnectionManager, ConnectionState, ConnectionStatus, GameSink, ReconnectScheduler};

/// Host-facing handle. The host calls the `on_*` methods from its event
/// dispatch; the worker task owns the connection.
#[derive(Clone)]
pub struct Bridge {
    manager: ConnectionManager,
    config_changed: Arc<Notify>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Bridge {
    /// Spawns the worker. Must be called from within a tokio runtime.
    pub fn start(settings: Arc<dyn SettingsStore>, sink: Arc<dyn GameSink>) -> Self {
        Self::start_with_policy(settings, sink, BackoffPolicy::default())
    }

    pub fn start_with_policy(
        settings: Arc<dyn SettingsStore>,
        sink: Arc<dyn GameSink>,
        policy: BackoffPolicy,
    ) -> Self {
        let manager = ConnectionManager::new(ConnectionState::new(), sink);
        let config_changed = Arc::new(Notify::new());
        let scheduler = ReconnectScheduler::new(manager.clone(), settings, Arc::clone(&config_changed))
            .with_policy(policy);
        let worker = tokio::spawn(scheduler.run());

        Self {
            manager,
            config_changed,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.manager.state().subscribe()
    }

    pub async fn on_chat(&self, event: &ChatEvent) {
        tracing::trace!(target_kind = ?event.to, kind = ?event.kind, "Game chat event");
        if let Some(formatter) = self.joined_formatter() {
            self.relay(formatter.chat(event)).await;
        }
    }

    pub async fn on_player_join(&self, player: &PlayerRecord) {
        if let Some(formatter) = self.joined_formatter() {
            self.relay(formatter.join(player)).await;
        }
    }

    pub async fn on_player_part(&self, player: &PlayerRecord) {
        if let Some(formatter) = self.joined_formatter() {
            self.relay(formatter.part(player)).await;
        }
    }

    /// Reacts to a host variable change. The store already holds `value`.
    pub async fn on_config_changed(&self, key: &str, value: &str) {
        if config::requires_reconnect(key) {
            tracing::info!(config.key = %key, "Connection setting changed, reconnecting");
            self.manager.stop().await;
        } else if key == config::KEY_NICK
            && self.manager.state().status() == ConnectionStatus::Joined
            && !value.trim().is_empty()
        {
            tracing::info!(irc.nick = %value.trim(), "Changing nick");
            if let Err(e) = self.manager.send(&format!("{} {}", CMD_NICK, value.trim())).await {
                tracing::debug!(error = %e, "Nick change not sent");
            }
        }
        self.config_changed.notify_one();
    }

    /// Stops the bridge for good and waits for the worker to exit.
    pub async fn cleanup(&self) {
        self.manager.cleanup().await;
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "IRC relay worker panicked");
            }
        }
    }

    fn joined_formatter(&self) -> Option<OutboundFormatter> {
        let state = self.manager.state();
        if state.status() != ConnectionStatus::Joined {
            return None;
        }
        state.config().map(|config| OutboundFormatter::from_config(&config))
    }

    async fn relay(&self, line: Option<String>) {
        let Some(line) = line else {
            return;
        };
        if let Err(e) = self.manager.send(&line).await {
            tracing::debug!(error = %e, "Game event dropped");
        }
    }
}
