#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::items_after_statements
    )
)]

//! Broker Gateway - Broker Plugin & Adapter Framework
//!
//! Puts many brokerage backends behind one canonical trading and market
//! data vocabulary. Broker plugins are discovered and conditionally
//! activated at startup; each active plugin contributes an authenticate
//! entry point and a streaming adapter factory.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Canonical vocabulary and pure rules
//!   - `mapping`: Canonical ↔ native code tables
//!   - `capability`: What each broker supports
//!   - `subscription`: Adapter state machine and subscription set
//!   - `plugin`: Plugin metadata and activation policy
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport, normalizer, authenticator, margin, metadata
//!   - `services`: Streaming adapter, plugin catalog, loader, registry
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `brokers`: Built-in broker plugins
//!   - `plugins`: Plugin directory and `plugin.json`
//!   - `websocket`: WebSocket transport
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! plugin dir ──► PluginLoader ──► BrokerRegistry ──► authenticate ──► BrokerSession
//!                                       │
//!                                       ▼
//! broker WS ◄──► Transport ◄──► StreamingAdapter ──► CanonicalEvent ──► subscribers
//!                                (normalizer + mappings + capabilities)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Canonical vocabulary with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::capability::{CapabilityError, CapabilityRegistry, NotSupportedError};
pub use domain::mapping::{BrokerMappings, MappingTable};
pub use domain::plugin::{
    ActivationDecision, ActivationPolicy, BrokerId, BrokerPluginDescriptor, DescriptorLookup,
    Region, should_activate,
};
pub use domain::streaming::{CanonicalEvent, EventPayload};
pub use domain::subscription::{AdapterState, NativeRoute, SubscriptionKey};
pub use domain::vocabulary::{FeedType, Operation};

// Ports
pub use application::ports::{AuthError, Credentials, ParseError, Transport, TransportError};

// Services
pub use application::services::{
    AdapterDirectory, AdapterError, AdapterSettings, BrokerRegistry, LoadOutcome, PluginCatalog,
    PluginLoader, PluginResolutionError, SharedRegistry, StreamingAdapter,
};

// Infrastructure
pub use infrastructure::brokers::builtin_catalog;
pub use infrastructure::config::{ConfigError, GatewayConfig};
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::plugins::{FsDescriptorSource, discover_candidates};
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
pub use infrastructure::websocket::WebSocketTransport;
