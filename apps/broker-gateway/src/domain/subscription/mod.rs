//! Adapter Session State
//!
//! The connection state machine and active subscription set owned by a
//! streaming adapter. Pure state: no I/O, no locking. The adapter wraps an
//! [`AdapterSession`] in a lock and drives it from its control operations.
//!
//! # State Machine
//!
//! ```text
//!                 connect                 transport ready
//! Disconnected ───────────► Connecting ─────────────────► Connected
//!      ▲                        │                          │    ▲
//!      │ disconnect             │ error / timeout          │    │ last unsubscribe
//!      │                        ▼               subscribe  ▼    │
//!      └──────────────────── Failed ◄──── error ──────── Subscribed
//!                              │
//!                              └──── reconnect ───► Connecting
//! ```
//!
//! Every transition into `Failed` or `Disconnected` clears the active
//! subscription set; a reconnecting owner re-subscribes explicitly.
//!
//! Inbound events are routed by the native code each subscription was sent
//! with, so several canonical spellings of one native exchange (index
//! aliases) each receive the feed under the exchange they asked for.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::vocabulary::FeedType;

// =============================================================================
// Subscription Key
// =============================================================================

/// Identity of one canonical subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    /// Canonical exchange code, uppercase.
    pub exchange: String,
    /// Symbol, uppercase.
    pub symbol: String,
    /// Feed type.
    pub feed_type: FeedType,
}

impl SubscriptionKey {
    /// Build a key, normalizing exchange and symbol.
    #[must_use]
    pub fn new(exchange: &str, symbol: &str, feed_type: FeedType) -> Self {
        Self {
            exchange: exchange.trim().to_ascii_uppercase(),
            symbol: symbol.trim().to_ascii_uppercase(),
            feed_type,
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.exchange, self.symbol, self.feed_type)
    }
}

/// Wire identity of a subscription: what the broker actually streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeRoute {
    /// Native exchange code, uppercase.
    pub exchange: String,
    /// Symbol, uppercase.
    pub symbol: String,
    /// Feed type.
    pub feed_type: FeedType,
}

impl NativeRoute {
    /// Build a route, normalizing exchange and symbol.
    #[must_use]
    pub fn new(native_exchange: &str, symbol: &str, feed_type: FeedType) -> Self {
        Self {
            exchange: native_exchange.trim().to_ascii_uppercase(),
            symbol: symbol.trim().to_ascii_uppercase(),
            feed_type,
        }
    }
}

// =============================================================================
// Adapter State
// =============================================================================

/// Connection state of a streaming adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    /// No transport.
    #[default]
    Disconnected,
    /// Transport being established.
    Connecting,
    /// Transport ready, nothing subscribed.
    Connected,
    /// Transport ready with at least one active subscription.
    Subscribed,
    /// Transport lost or failed to establish.
    Failed,
}

impl AdapterState {
    /// State name for logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
            Self::Failed => "failed",
        }
    }

    /// Whether a transport is up.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Subscribed)
    }

    /// Whether `reconnect` may be called from here.
    #[must_use]
    pub const fn can_reconnect(self) -> bool {
        matches!(self, Self::Failed | Self::Disconnected)
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control operation was attempted from a state that does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {operation} while {state}")]
pub struct TransitionError {
    /// Attempted operation.
    pub operation: &'static str,
    /// State at the time of the attempt.
    pub state: AdapterState,
}

/// Outcome of starting a connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStart {
    /// Moved to `Connecting`; the caller must now open the transport.
    Started,
    /// Already connected; nothing to do.
    AlreadyConnected,
}

// =============================================================================
// Adapter Session
// =============================================================================

/// State machine plus active subscription set.
#[derive(Debug, Default)]
pub struct AdapterSession {
    state: AdapterState,
    subscriptions: HashMap<SubscriptionKey, NativeRoute>,
    routes: HashMap<NativeRoute, BTreeSet<SubscriptionKey>>,
    last_error: Option<String>,
}

impl AdapterSession {
    /// Create a disconnected session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AdapterState {
        self.state
    }

    /// Reason of the most recent failure.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// `Disconnected → Connecting`.
    pub fn begin_connect(&mut self) -> Result<ConnectStart, TransitionError> {
        match self.state {
            AdapterState::Disconnected => {
                self.state = AdapterState::Connecting;
                Ok(ConnectStart::Started)
            }
            AdapterState::Connected | AdapterState::Subscribed => Ok(ConnectStart::AlreadyConnected),
            state @ (AdapterState::Connecting | AdapterState::Failed) => Err(TransitionError {
                operation: "connect",
                state,
            }),
        }
    }

    /// `Failed | Disconnected → Connecting`.
    pub fn begin_reconnect(&mut self) -> Result<(), TransitionError> {
        if !self.state.can_reconnect() {
            return Err(TransitionError {
                operation: "reconnect",
                state: self.state,
            });
        }
        self.clear_subscriptions();
        self.state = AdapterState::Connecting;
        Ok(())
    }

    /// `Connecting → Connected`.
    pub fn mark_connected(&mut self) -> Result<(), TransitionError> {
        if self.state != AdapterState::Connecting {
            return Err(TransitionError {
                operation: "complete connect",
                state: self.state,
            });
        }
        self.state = AdapterState::Connected;
        self.last_error = None;
        Ok(())
    }

    /// Any state → `Failed`. Returns the subscriptions that were dropped.
    pub fn fail(&mut self, reason: impl Into<String>) -> Vec<SubscriptionKey> {
        self.state = AdapterState::Failed;
        self.last_error = Some(reason.into());
        self.clear_subscriptions()
    }

    /// Any state → `Disconnected`. Returns the subscriptions that were dropped.
    pub fn disconnect(&mut self) -> Vec<SubscriptionKey> {
        self.state = AdapterState::Disconnected;
        self.clear_subscriptions()
    }

    /// Subscriptions require a live transport.
    pub const fn ensure_connected(&self, operation: &'static str) -> Result<(), TransitionError> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(TransitionError {
                operation,
                state: self.state,
            })
        }
    }

    /// Record an accepted subscription and the native route it was sent
    /// on. Returns false if it was already active.
    pub fn add_subscription(
        &mut self,
        key: SubscriptionKey,
        route: NativeRoute,
    ) -> Result<bool, TransitionError> {
        self.ensure_connected("subscribe")?;
        self.state = AdapterState::Subscribed;
        if self.subscriptions.contains_key(&key) {
            return Ok(false);
        }
        self.routes
            .entry(route.clone())
            .or_default()
            .insert(key.clone());
        self.subscriptions.insert(key, route);
        Ok(true)
    }

    /// Forget a subscription. Returns false if it was not active.
    ///
    /// Emptying the set drops back to `Connected`, not `Disconnected`.
    pub fn remove_subscription(&mut self, key: &SubscriptionKey) -> bool {
        let removed = match self.subscriptions.remove(key) {
            Some(route) => {
                if let Some(keys) = self.routes.get_mut(&route) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.routes.remove(&route);
                    }
                }
                true
            }
            None => false,
        };
        if self.subscriptions.is_empty() && self.state == AdapterState::Subscribed {
            self.state = AdapterState::Connected;
        }
        removed
    }

    /// Whether events for this key should be emitted.
    #[must_use]
    pub fn is_active(&self, key: &SubscriptionKey) -> bool {
        self.subscriptions.contains_key(key)
    }

    /// Active subscriptions sent on a native route, sorted.
    #[must_use]
    pub fn subscribers(&self, route: &NativeRoute) -> Vec<SubscriptionKey> {
        self.routes
            .get(route)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the active set, sorted.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.subscriptions.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn clear_subscriptions(&mut self) -> Vec<SubscriptionKey> {
        self.routes.clear();
        self.subscriptions.drain().map(|(key, _)| key).collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
