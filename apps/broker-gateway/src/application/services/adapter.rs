//! Streaming Adapter
//!
//! One broker streaming connection exposed through the canonical
//! interface: connect, subscribe, unsubscribe, disconnect, reconnect, and
//! a broadcast stream of [`CanonicalEvent`]s.
//!
//! # Concurrency
//!
//! - Control operations are serialized by an async mutex that also owns the
//!   outbound half of the transport.
//! - The inbound half is drained by a pump task; it only reads the
//!   subscription set and never blocks control operations.
//! - State lives in a `parking_lot::RwLock` and is never held across an
//!   `.await`.
//!
//! # Failure
//!
//! Any transport error (open, send, or read) moves the adapter to
//! `Failed` and clears the active subscription set. Recovery is explicit:
//! `reconnect` followed by re-subscribing, usually driven by a
//! `ReconnectSupervisor`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AdapterFactory, BrokerSession, FrameSink, FrameSource, MessageNormalizer, NativeSubscription,
    SubscriptionEncoder, Transport, TransportError,
};
use crate::domain::capability::{CapabilityError, CapabilityRegistry};
use crate::domain::mapping::BrokerMappings;
use crate::domain::plugin::BrokerId;
use crate::domain::streaming::CanonicalEvent;
use crate::domain::subscription::{
    AdapterSession, AdapterState, ConnectStart, NativeRoute, SubscriptionKey, TransitionError,
};
use crate::domain::vocabulary::FeedType;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by adapter control operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// The broker does not support the requested subscription.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The transport failed or timed out.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation is not allowed in the current state.
    #[error(transparent)]
    InvalidState(#[from] TransitionError),
}

impl AdapterError {
    /// Whether the failure was a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Timeout { .. }))
    }
}

// =============================================================================
// Settings & Profile
// =============================================================================

/// Timeouts and buffer sizes for one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterSettings {
    /// Limit on opening the transport.
    pub connect_timeout: Duration,
    /// Limit on sending one control frame.
    pub request_timeout: Duration,
    /// Broadcast channel capacity for canonical events.
    pub event_capacity: usize,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            event_capacity: 4096,
        }
    }
}

/// Everything broker-specific an adapter needs.
pub struct BrokerProfile {
    /// Broker identifier.
    pub broker: BrokerId,
    /// Canonical ↔ native code tables.
    pub mappings: BrokerMappings,
    /// Declared capabilities.
    pub capabilities: CapabilityRegistry,
    /// Inbound frame normalization.
    pub normalizer: Arc<dyn MessageNormalizer>,
    /// Outbound subscription framing.
    pub encoder: Arc<dyn SubscriptionEncoder>,
}

impl std::fmt::Debug for BrokerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerProfile")
            .field("broker", &self.broker)
            .field("feeds", &self.capabilities.supported_feeds())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

#[derive(Debug, Default)]
struct AdapterCounters {
    events_emitted: AtomicU64,
    events_unsubscribed: AtomicU64,
    parse_errors: AtomicU64,
    capability_rejections: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time adapter diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AdapterSnapshot {
    /// Broker identifier.
    pub broker: String,
    /// Current state.
    pub state: AdapterState,
    /// Active subscriptions.
    pub subscriptions: usize,
    /// Reason of the most recent failure.
    pub last_error: Option<String>,
    /// Canonical events delivered.
    pub events_emitted: u64,
    /// Events discarded for lack of a matching subscription.
    pub events_unsubscribed: u64,
    /// Frames that failed normalization.
    pub parse_errors: u64,
    /// Subscriptions rejected by capability checks.
    pub capability_rejections: u64,
    /// Reconnect attempts.
    pub reconnects: u64,
}

// =============================================================================
// Streaming Adapter
// =============================================================================

/// Canonical streaming interface over one broker connection.
pub struct StreamingAdapter {
    profile: Arc<BrokerProfile>,
    broker_session: BrokerSession,
    transport: Arc<dyn Transport>,
    settings: AdapterSettings,
    session: RwLock<AdapterSession>,
    control: AsyncMutex<Option<Box<dyn FrameSink>>>,
    pump: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<CanonicalEvent>,
    state_tx: watch::Sender<AdapterState>,
    counters: AdapterCounters,
}

impl StreamingAdapter {
    /// Create a disconnected adapter.
    #[must_use]
    pub fn new(
        profile: Arc<BrokerProfile>,
        broker_session: BrokerSession,
        transport: Arc<dyn Transport>,
        settings: AdapterSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let (state_tx, _) = watch::channel(AdapterState::Disconnected);
        Self {
            profile,
            broker_session,
            transport,
            settings,
            session: RwLock::new(AdapterSession::new()),
            control: AsyncMutex::new(None),
            pump: Mutex::new(None),
            events,
            state_tx,
            counters: AdapterCounters::default(),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Broker identifier.
    #[must_use]
    pub fn broker(&self) -> &BrokerId {
        &self.profile.broker
    }

    /// Session this adapter was created from.
    #[must_use]
    pub const fn broker_session(&self) -> &BrokerSession {
        &self.broker_session
    }

    /// Broker capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.profile.capabilities
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AdapterState {
        self.session.read().state()
    }

    /// Active subscriptions, sorted.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionKey> {
        self.session.read().subscriptions()
    }

    /// Subscribe to canonical events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<CanonicalEvent> {
        self.events.subscribe()
    }

    /// Observe state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<AdapterState> {
        self.state_tx.subscribe()
    }

    /// Diagnostics snapshot.
    #[must_use]
    pub fn snapshot(&self) -> AdapterSnapshot {
        let (state, subscriptions, last_error) = {
            let session = self.session.read();
            (
                session.state(),
                session.subscription_count(),
                session.last_error().map(str::to_string),
            )
        };
        AdapterSnapshot {
            broker: self.profile.broker.to_string(),
            state,
            subscriptions,
            last_error,
            events_emitted: self.counters.events_emitted.load(Ordering::Relaxed),
            events_unsubscribed: self.counters.events_unsubscribed.load(Ordering::Relaxed),
            parse_errors: self.counters.parse_errors.load(Ordering::Relaxed),
            capability_rejections: self.counters.capability_rejections.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
        }
    }

    // -------------------------------------------------------------------------
    // Control Operations
    // -------------------------------------------------------------------------

    /// Establish the transport. A no-op when already connected.
    ///
    /// Cancelling the returned future while `Connecting` leaves the adapter
    /// in `Failed`.
    pub async fn connect(self: &Arc<Self>) -> Result<(), AdapterError> {
        let mut sink = self.control.lock().await;

        if self.update_session(AdapterSession::begin_connect)? == ConnectStart::AlreadyConnected {
            tracing::debug!(broker = %self.profile.broker, "Already connected");
            return Ok(());
        }

        self.establish(&mut sink).await
    }

    /// Re-establish the transport from `Failed` or `Disconnected`.
    ///
    /// The subscription set starts empty; callers re-subscribe.
    pub async fn reconnect(self: &Arc<Self>) -> Result<(), AdapterError> {
        let mut sink = self.control.lock().await;

        let state = self.state();
        if !state.can_reconnect() {
            return Err(TransitionError {
                operation: "reconnect",
                state,
            }
            .into());
        }

        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::record_reconnect(self.profile.broker.as_str());

        self.cancel_pump();
        self.close_sink(&mut sink).await;
        self.update_session(AdapterSession::begin_reconnect)?;

        self.establish(&mut sink).await
    }

    /// Subscribe to a canonical `(exchange, symbol, feed)`.
    ///
    /// Capability is checked before anything is sent. Subscribing to an
    /// already active key is a no-op.
    pub async fn subscribe(
        &self,
        exchange: &str,
        symbol: &str,
        feed_type: FeedType,
    ) -> Result<(), AdapterError> {
        let key = SubscriptionKey::new(exchange, symbol, feed_type);

        if let Err(e) = self
            .profile
            .capabilities
            .check_subscription(&key.exchange, feed_type)
        {
            self.counters
                .capability_rejections
                .fetch_add(1, Ordering::Relaxed);
            metrics::record_capability_rejection(self.profile.broker.as_str(), feed_type);
            tracing::warn!(broker = %self.profile.broker, subscription = %key, error = %e, "Subscription rejected");
            return Err(e.into());
        }

        let mut sink = self.control.lock().await;

        {
            let session = self.session.read();
            session.ensure_connected("subscribe")?;
            if session.is_active(&key) {
                tracing::debug!(broker = %self.profile.broker, subscription = %key, "Already subscribed");
                return Ok(());
            }
        }

        let native = self.native_subscription(&key, symbol);
        let frame = self.profile.encoder.subscribe_frame(&native);
        self.send_frame(&mut sink, frame, "subscribe").await?;

        let route = NativeRoute::new(&native.exchange, &native.symbol, feed_type);
        self.update_session(|session| session.add_subscription(key.clone(), route))?;
        tracing::info!(
            broker = %self.profile.broker,
            subscription = %key,
            native_exchange = %native.exchange,
            native_feed = %native.feed_code,
            "Subscribed"
        );
        Ok(())
    }

    /// Unsubscribe from a canonical `(exchange, symbol, feed)`.
    ///
    /// Unsubscribing from an inactive key is a no-op. Removing the last
    /// subscription leaves the adapter `Connected`.
    pub async fn unsubscribe(
        &self,
        exchange: &str,
        symbol: &str,
        feed_type: FeedType,
    ) -> Result<(), AdapterError> {
        let key = SubscriptionKey::new(exchange, symbol, feed_type);
        let mut sink = self.control.lock().await;

        if !self.session.read().is_active(&key) {
            tracing::debug!(broker = %self.profile.broker, subscription = %key, "Not subscribed");
            return Ok(());
        }

        let native = self.native_subscription(&key, symbol);
        let frame = self.profile.encoder.unsubscribe_frame(&native);
        self.send_frame(&mut sink, frame, "unsubscribe").await?;

        self.update_session(|session| session.remove_subscription(&key));
        tracing::info!(broker = %self.profile.broker, subscription = %key, "Unsubscribed");
        Ok(())
    }

    /// Close the transport and clear every subscription.
    pub async fn disconnect(&self) {
        let mut sink = self.control.lock().await;

        self.cancel_pump();
        self.close_sink(&mut sink).await;

        let dropped = self.update_session(AdapterSession::disconnect);
        tracing::info!(
            broker = %self.profile.broker,
            dropped_subscriptions = dropped.len(),
            "Disconnected"
        );
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Normalize one inbound frame and deliver it if subscribed.
    ///
    /// The event is delivered once per subscription sent on the same native
    /// route, labelled with that subscription's exchange. Returns the first
    /// delivered event. Parse failures are logged and counted, never
    /// propagated.
    pub fn ingest_frame(&self, raw: &str) -> Option<CanonicalEvent> {
        let broker = self.profile.broker.as_str();
        let started = Instant::now();
        let result = self.profile.normalizer.normalize(raw, &self.profile.mappings);
        metrics::record_normalize_duration(broker, started.elapsed());

        match result {
            Ok(Some(event)) => self.dispatch(event),
            Ok(None) => None,
            Err(e) => {
                self.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_parse_error(broker);
                tracing::warn!(broker, error = %e, "Dropping unparseable frame");
                None
            }
        }
    }

    fn dispatch(&self, event: CanonicalEvent) -> Option<CanonicalEvent> {
        let broker = self.profile.broker.as_str();
        let route = NativeRoute::new(
            self.profile.mappings.exchange.to_native(&event.exchange),
            &event.symbol,
            event.feed_type,
        );
        let subscribers = self.session.read().subscribers(&route);

        if subscribers.is_empty() {
            self.counters
                .events_unsubscribed
                .fetch_add(1, Ordering::Relaxed);
            metrics::record_event_unsubscribed(broker, event.feed_type);
            tracing::trace!(broker, subscription = %event.key(), "Dropping unsubscribed event");
            return None;
        }

        let mut first = None;
        for key in subscribers {
            let delivered = CanonicalEvent {
                exchange: key.exchange,
                ..event.clone()
            };
            self.counters.events_emitted.fetch_add(1, Ordering::Relaxed);
            metrics::record_event_emitted(broker, delivered.feed_type);

            // No receivers is not an error
            let _ = self.events.send(delivered.clone());
            first.get_or_insert(delivered);
        }
        first
    }

    async fn run_pump(
        adapter: Weak<Self>,
        mut source: Box<dyn FrameSource>,
        token: CancellationToken,
    ) {
        loop {
            let frame = tokio::select! {
                () = token.cancelled() => break,
                frame = source.next_frame() => frame,
            };

            let Some(adapter) = adapter.upgrade() else {
                break;
            };

            match frame {
                Some(Ok(text)) => {
                    adapter.ingest_frame(&text);
                }
                Some(Err(e)) => {
                    adapter.pump_failed(&token, &e);
                    break;
                }
                None => {
                    adapter.pump_failed(&token, &TransportError::Closed);
                    break;
                }
            }
        }
    }

    fn pump_failed(&self, token: &CancellationToken, error: &TransportError) {
        let dropped = self.update_session(|session| {
            // A cancelled pump belongs to a connection being torn down on purpose
            (!token.is_cancelled()).then(|| session.fail(error.to_string()))
        });

        if let Some(dropped) = dropped {
            tracing::warn!(
                broker = %self.profile.broker,
                error = %error,
                dropped_subscriptions = dropped.len(),
                "Broker stream lost"
            );
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn establish(
        self: &Arc<Self>,
        sink: &mut Option<Box<dyn FrameSink>>,
    ) -> Result<(), AdapterError> {
        let guard = ConnectingGuard::new(self);

        tracing::info!(
            broker = %self.profile.broker,
            endpoint = %self.transport.endpoint(),
            "Connecting to broker stream"
        );

        let (writer, reader) =
            match tokio::time::timeout(self.settings.connect_timeout, self.transport.open()).await {
                Ok(Ok(halves)) => halves,
                Ok(Err(e)) => {
                    guard.fail(&e);
                    return Err(e.into());
                }
                Err(_) => {
                    let e = TransportError::Timeout {
                        operation: "connect",
                        after: self.settings.connect_timeout,
                    };
                    guard.fail(&e);
                    return Err(e.into());
                }
            };

        *sink = Some(writer);
        self.update_session(AdapterSession::mark_connected)?;
        guard.disarm();

        self.spawn_pump(reader);
        tracing::info!(broker = %self.profile.broker, "Broker stream connected");
        Ok(())
    }

    fn spawn_pump(self: &Arc<Self>, reader: Box<dyn FrameSource>) {
        let token = CancellationToken::new();
        if let Some(previous) = self.pump.lock().replace(token.clone()) {
            previous.cancel();
        }
        tokio::spawn(Self::run_pump(Arc::downgrade(self), reader, token));
    }

    fn cancel_pump(&self) {
        if let Some(token) = self.pump.lock().take() {
            token.cancel();
        }
    }

    async fn close_sink(&self, sink: &mut Option<Box<dyn FrameSink>>) {
        let Some(mut writer) = sink.take() else {
            return;
        };
        match tokio::time::timeout(self.settings.request_timeout, writer.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(broker = %self.profile.broker, error = %e, "Close failed"),
            Err(_) => tracing::debug!(broker = %self.profile.broker, "Close timed out"),
        }
    }

    async fn send_frame(
        &self,
        sink: &mut Option<Box<dyn FrameSink>>,
        frame: String,
        operation: &'static str,
    ) -> Result<(), AdapterError> {
        let Some(writer) = sink.as_mut() else {
            return Err(TransitionError {
                operation,
                state: self.state(),
            }
            .into());
        };

        let result = match tokio::time::timeout(self.settings.request_timeout, writer.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                operation,
                after: self.settings.request_timeout,
            }),
        };

        if let Err(e) = result {
            self.fail(&e);
            return Err(e.into());
        }
        Ok(())
    }

    fn fail(&self, error: &TransportError) {
        self.cancel_pump();
        let dropped = self.update_session(|session| session.fail(error.to_string()));
        tracing::warn!(
            broker = %self.profile.broker,
            error = %error,
            dropped_subscriptions = dropped.len(),
            "Adapter failed"
        );
    }

    fn native_subscription(&self, key: &SubscriptionKey, symbol: &str) -> NativeSubscription {
        NativeSubscription::from_canonical(
            &self.profile.mappings,
            &key.exchange,
            symbol.trim(),
            key.feed_type,
            self.profile.capabilities.max_depth_levels(&key.exchange),
        )
    }

    fn update_session<R>(&self, f: impl FnOnce(&mut AdapterSession) -> R) -> R {
        let (result, before, after, count) = {
            let mut session = self.session.write();
            let before = session.state();
            let result = f(&mut session);
            (result, before, session.state(), session.subscription_count())
        };

        let broker = self.profile.broker.as_str();
        if before != after {
            tracing::debug!(broker, from = %before, to = %after, "Adapter state changed");
            metrics::record_state_transition(broker, after);
            self.state_tx.send_replace(after);
        }
        metrics::set_active_subscriptions(broker, count);
        result
    }
}

impl std::fmt::Debug for StreamingAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingAdapter")
            .field("broker", &self.profile.broker)
            .field("state", &self.state())
            .field("endpoint", &self.transport.endpoint())
            .finish_non_exhaustive()
    }
}

/// Moves a `Connecting` adapter to `Failed` if the connect future is
/// dropped before the transport is ready.
struct ConnectingGuard<'a> {
    adapter: &'a StreamingAdapter,
    armed: bool,
}

impl<'a> ConnectingGuard<'a> {
    const fn new(adapter: &'a StreamingAdapter) -> Self {
        Self {
            adapter,
            armed: true,
        }
    }

    fn fail(mut self, error: &TransportError) {
        self.armed = false;
        self.adapter.fail(error);
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.adapter.update_session(|session| {
            if session.state() == AdapterState::Connecting {
                session.fail("connect cancelled");
            }
        });
    }
}

// =============================================================================
// Standard Factory
// =============================================================================

/// Adapter factory for brokers described by a [`BrokerProfile`].
pub struct StandardAdapterFactory {
    profile: Arc<BrokerProfile>,
    stream_url: fn(&BrokerSession) -> String,
}

impl StandardAdapterFactory {
    /// Create a factory.
    #[must_use]
    pub fn new(profile: BrokerProfile, stream_url: fn(&BrokerSession) -> String) -> Self {
        Self {
            profile: Arc::new(profile),
            stream_url,
        }
    }

    /// The shared profile.
    #[must_use]
    pub fn profile(&self) -> &Arc<BrokerProfile> {
        &self.profile
    }
}

impl AdapterFactory for StandardAdapterFactory {
    fn stream_url(&self, session: &BrokerSession) -> String {
        (self.stream_url)(session)
    }

    fn capabilities(&self) -> &CapabilityRegistry {
        &self.profile.capabilities
    }

    fn create(
        &self,
        session: BrokerSession,
        transport: Arc<dyn Transport>,
        settings: AdapterSettings,
    ) -> Arc<StreamingAdapter> {
        Arc::new(StreamingAdapter::new(
            Arc::clone(&self.profile),
            session,
            transport,
            settings,
        ))
    }
}

// =============================================================================
// Test Support
// =============================================================================


// =============================================================================
// Tests
// =============================================================================
