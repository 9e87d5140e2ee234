//! Domain Layer - Broker-neutral types and rules.
//!
//! Everything here is pure: canonical vocabulary, mapping tables,
//! capability declarations, plugin activation, and the adapter state
//! machine. No I/O and no async.

/// Canonical feed types, mapping categories, and optional operations.
pub mod vocabulary;

/// Bidirectional canonical ↔ native code tables.
pub mod mapping;

/// Per-broker capability declarations.
pub mod capability;

/// Canonical streaming events.
pub mod streaming;

/// Adapter state machine and active subscription set.
pub mod subscription;

/// Plugin identity, metadata, and activation rule.
pub mod plugin;

/// Margin calculator inputs and outputs.
pub mod margin;
