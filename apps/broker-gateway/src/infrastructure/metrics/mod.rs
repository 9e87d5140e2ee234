//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Registry**: Registered, inactive, and failed broker plugins
//! - **Events**: Canonical events emitted, dropped, and unparseable
//! - **Adapters**: State transitions, reconnects, capability rejections
//! - **Latency**: Inbound frame normalization time
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::subscription::AdapterState;
use crate::domain::vocabulary::FeedType;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Registry gauges
    describe_gauge!(
        "broker_gateway_registered_brokers",
        "Number of broker plugins in the active registry"
    );
    describe_gauge!(
        "broker_gateway_inactive_brokers",
        "Number of discovered broker plugins left inactive"
    );
    describe_counter!(
        "broker_gateway_plugin_failures_total",
        "Broker plugins skipped because they could not be resolved"
    );

    // Event counters
    describe_counter!(
        "broker_gateway_events_emitted_total",
        "Canonical events delivered to adapter subscribers"
    );
    describe_counter!(
        "broker_gateway_events_unsubscribed_total",
        "Inbound events discarded because no active subscription matched"
    );
    describe_counter!(
        "broker_gateway_parse_errors_total",
        "Inbound frames that could not be normalized"
    );

    // Adapter counters
    describe_counter!(
        "broker_gateway_capability_rejections_total",
        "Subscriptions rejected by the capability registry"
    );
    describe_counter!(
        "broker_gateway_state_transitions_total",
        "Adapter state transitions by target state"
    );
    describe_counter!(
        "broker_gateway_reconnects_total",
        "Adapter reconnection attempts"
    );
    describe_gauge!(
        "broker_gateway_active_subscriptions",
        "Active subscriptions per broker"
    );

    // Latency histograms
    describe_histogram!(
        "broker_gateway_normalize_seconds",
        "Time to normalize one inbound frame"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Update registry size gauges after a load.
pub fn set_registry_size(registered: usize, inactive: usize) {
    gauge!("broker_gateway_registered_brokers").set(registered as f64);
    gauge!("broker_gateway_inactive_brokers").set(inactive as f64);
}

/// Record a plugin skipped during loading.
pub fn record_plugin_failure(broker: &str) {
    counter!(
        "broker_gateway_plugin_failures_total",
        "broker" => broker.to_string()
    )
    .increment(1);
}

/// Record a canonical event delivered.
pub fn record_event_emitted(broker: &str, feed: FeedType) {
    counter!(
        "broker_gateway_events_emitted_total",
        "broker" => broker.to_string(),
        "feed" => feed.as_str()
    )
    .increment(1);
}

/// Record an inbound event with no matching subscription.
pub fn record_event_unsubscribed(broker: &str, feed: FeedType) {
    counter!(
        "broker_gateway_events_unsubscribed_total",
        "broker" => broker.to_string(),
        "feed" => feed.as_str()
    )
    .increment(1);
}

/// Record an inbound frame that failed normalization.
pub fn record_parse_error(broker: &str) {
    counter!(
        "broker_gateway_parse_errors_total",
        "broker" => broker.to_string()
    )
    .increment(1);
}

/// Record a subscription rejected by capability checks.
pub fn record_capability_rejection(broker: &str, feed: FeedType) {
    counter!(
        "broker_gateway_capability_rejections_total",
        "broker" => broker.to_string(),
        "feed" => feed.as_str()
    )
    .increment(1);
}

/// Record an adapter state transition.
pub fn record_state_transition(broker: &str, state: AdapterState) {
    counter!(
        "broker_gateway_state_transitions_total",
        "broker" => broker.to_string(),
        "state" => state.as_str()
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect(broker: &str) {
    counter!(
        "broker_gateway_reconnects_total",
        "broker" => broker.to_string()
    )
    .increment(1);
}

/// Update the active subscription gauge.
pub fn set_active_subscriptions(broker: &str, count: usize) {
    gauge!(
        "broker_gateway_active_subscriptions",
        "broker" => broker.to_string()
    )
    .set(count as f64);
}

/// Record frame normalization duration.
pub fn record_normalize_duration(broker: &str, duration: Duration) {
    histogram!(
        "broker_gateway_normalize_seconds",
        "broker" => broker.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        // No recorder installed; every call is a no-op.
        record_event_emitted("kotak", FeedType::Ltp);
        record_event_unsubscribed("kotak", FeedType::Quote);
        record_parse_error("dhan_sandbox");
        record_capability_rejection("wisdom", FeedType::Depth);
        record_state_transition("kotak", AdapterState::Failed);
        record_reconnect("kotak");
        set_active_subscriptions("kotak", 3);
        set_registry_size(2, 1);
        record_plugin_failure("broken");
        record_normalize_duration("kotak", Duration::from_micros(12));
    }
}
