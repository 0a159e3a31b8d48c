use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};

use super::connection::ConnectionManager;
use super::error::{IrcError, Result as IrcResult};
use super::types::ConnectionStatus;
use crate::config::{RelayConfig, SettingsStore};

pub const BASE_BACKOFF: Duration = Duration::from_secs(5);
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Wait before the first attempt and after the first failure.
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: BASE_BACKOFF,
            max: MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    /// `base * 2^(retry_count - 1)`, capped at `max`. The first attempt and
    /// the first retry both wait `base`.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32
            .checked_pow(retry_count.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Owns the worker loop: wait, connect, relay until the link drops, repeat.
pub struct ReconnectScheduler {
    manager: ConnectionManager,
    settings: Arc<dyn SettingsStore>,
    config_changed: Arc<Notify>,
    policy: BackoffPolicy,
}

impl ReconnectScheduler {
    pub fn new(
        manager: ConnectionManager,
        settings: Arc<dyn SettingsStore>,
        config_changed: Arc<Notify>,
    ) -> Self {
        Self {
            manager,
            settings,
            config_changed,
            policy: BackoffPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn run(self) {
        let state = Arc::clone(self.manager.state());
        let mut status_rx = state.subscribe();
        tracing::info!("IRC relay worker started");

        loop {
            let retry_count = state.retry_count();
            let delay = self.policy.delay(retry_count);
            tracing::debug!(retry_count, delay = ?delay, "Waiting before connection attempt");

            tokio::select! {
                biased;
                _ = wait_stopped(&mut status_rx) => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let config = match RelayConfig::from_store(self.settings.as_ref()) {
                Ok(config) => Arc::new(config),
                Err(e) => {
                    let e = IrcError::from(e);
                    tracing::warn!(error = %e, "Not connecting until the configuration changes");
                    tokio::select! {
                        biased;
                        _ = wait_stopped(&mut status_rx) => break,
                        _ = self.config_changed.notified() => {
                            tracing::debug!("Configuration changed, retrying");
                            continue;
                        }
                    }
                }
            };

            let result = self.run_session(config).await;
            self.manager.stop().await;
            let send_failed = state.take_failure();

            match result {
                Ok(()) => {}
                Err(IrcError::ShutdownRequested) => break,
                Err(e) if e.is_retryable() || send_failed => {
                    let retry_count = state.record_failure();
                    tracing::warn!(
                        error = %e,
                        retry_count,
                        next_delay = ?self.policy.delay(retry_count),
                        "IRC connection failed, will reconnect"
                    );
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Connection closed on request, reconnecting");
                }
            }
        }

        tracing::info!("IRC relay worker stopped");
    }

    async fn run_session(&self, config: Arc<RelayConfig>) -> IrcResult<()> {
        let mut session = self.manager.connect(config).await?;
        tracing::debug!(connection.id = %session.id(), "Session started");

        self.manager.handshake(&mut session).await?;
        self.manager.authenticate(&mut session).await?;
        self.manager.join(&mut session).await?;
        self.manager.listen(&mut session).await
    }
}

async fn wait_stopped(status_rx: &mut watch::Receiver<ConnectionStatus>) {
    let _ = status_rx.wait_for(|s| s.is_stopped()).await;
}
