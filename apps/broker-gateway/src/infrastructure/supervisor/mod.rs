//! Reconnect Supervisor
//!
//! Watches one streaming adapter and restores it after transport loss:
//! waits out a backoff delay, reconnects, and re-issues every subscription
//! the owner asked for. An adapter the owner disconnected on purpose is
//! left alone.
//!
//! `run` takes an `Arc` so the owner keeps a handle and can change the
//! desired set while supervision is running.

pub mod reconnect;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::application::services::adapter::{AdapterError, StreamingAdapter};
use crate::domain::subscription::{AdapterState, SubscriptionKey};
use crate::domain::vocabulary::FeedType;

pub use reconnect::{ReconnectConfig, ReconnectPolicy};

/// Errors that end supervision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    /// Backoff attempts ran out.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxAttemptsExceeded(u32),
}

enum Recovery {
    Restored,
    Cancelled,
}

/// Keeps one adapter connected and its subscriptions restored.
pub struct ReconnectSupervisor {
    adapter: Arc<StreamingAdapter>,
    policy: Mutex<ReconnectPolicy>,
    desired: RwLock<BTreeMap<SubscriptionKey, String>>,
}

impl ReconnectSupervisor {
    /// Supervise an adapter.
    #[must_use]
    pub fn new(adapter: Arc<StreamingAdapter>, config: ReconnectConfig) -> Self {
        Self {
            adapter,
            policy: Mutex::new(ReconnectPolicy::new(config)),
            desired: RwLock::new(BTreeMap::new()),
        }
    }

    /// The supervised adapter.
    #[must_use]
    pub const fn adapter(&self) -> &Arc<StreamingAdapter> {
        &self.adapter
    }

    /// Subscribe through the adapter and remember the subscription for
    /// restoration.
    pub async fn subscribe(
        &self,
        exchange: &str,
        symbol: &str,
        feed_type: FeedType,
    ) -> Result<(), AdapterError> {
        self.adapter.subscribe(exchange, symbol, feed_type).await?;
        self.desired.write().insert(
            SubscriptionKey::new(exchange, symbol, feed_type),
            symbol.trim().to_string(),
        );
        Ok(())
    }

    /// Unsubscribe through the adapter and stop restoring the subscription.
    pub async fn unsubscribe(
        &self,
        exchange: &str,
        symbol: &str,
        feed_type: FeedType,
    ) -> Result<(), AdapterError> {
        self.desired
            .write()
            .remove(&SubscriptionKey::new(exchange, symbol, feed_type));
        self.adapter.unsubscribe(exchange, symbol, feed_type).await
    }

    /// Subscriptions that will be restored after a reconnect.
    #[must_use]
    pub fn desired(&self) -> Vec<SubscriptionKey> {
        self.desired.read().keys().cloned().collect()
    }

    /// Supervise until cancelled or attempts run out.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), SupervisorError> {
        let mut state_rx = self.adapter.watch_state();
        let broker = self.adapter.broker().to_string();
        tracing::info!(broker = %broker, "Reconnect supervisor started");

        loop {
            let state = *state_rx.borrow_and_update();

            if state == AdapterState::Failed {
                match self.recover(&cancel).await? {
                    Recovery::Restored => continue,
                    Recovery::Cancelled => break,
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(broker = %broker, "Reconnect supervisor stopped");
        Ok(())
    }

    async fn recover(&self, cancel: &CancellationToken) -> Result<Recovery, SupervisorError> {
        loop {
            let (next, attempt) = {
                let mut policy = self.policy.lock();
                (policy.next_delay(), policy.attempt_count())
            };
            let Some(delay) = next else {
                tracing::error!(broker = %self.adapter.broker(), attempts = attempt, "Giving up on reconnect");
                return Err(SupervisorError::MaxAttemptsExceeded(attempt));
            };

            tracing::info!(
                broker = %self.adapter.broker(),
                attempt,
                delay_ms = delay.as_millis(),
                "Reconnecting"
            );

            tokio::select! {
                () = cancel.cancelled() => return Ok(Recovery::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }

            match self.adapter.reconnect().await {
                Ok(()) => {}
                Err(AdapterError::InvalidState(_)) if self.adapter.state().is_connected() => {
                    tracing::debug!(broker = %self.adapter.broker(), "Adapter already reconnected");
                }
                Err(e) => {
                    tracing::warn!(broker = %self.adapter.broker(), error = %e, "Reconnect failed");
                    continue;
                }
            }

            self.restore_subscriptions().await;
            self.policy.lock().reset();
            return Ok(Recovery::Restored);
        }
    }

    async fn restore_subscriptions(&self) {
        let desired: Vec<_> = self
            .desired
            .read()
            .iter()
            .map(|(key, symbol)| (key.clone(), symbol.clone()))
            .collect();

        for (key, symbol) in desired {
            if let Err(e) = self
                .adapter
                .subscribe(&key.exchange, &symbol, key.feed_type)
                .await
            {
                tracing::warn!(
                    broker = %self.adapter.broker(),
                    subscription = %key,
                    error = %e,
                    "Failed to restore subscription"
                );
                if matches!(e, AdapterError::Transport(_)) {
                    return;
                }
            }
        }

        tracing::info!(
            broker = %self.adapter.broker(),
            restored = self.adapter.subscriptions().len(),
            "Subscriptions restored"
        );
    }
}
