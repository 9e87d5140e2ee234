//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the built-in broker plugins.

/// Built-in broker plugins (Kotak, Dhan sandbox, Wisdom).
pub mod brokers;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// In-process transport for tests and replays.
pub mod loopback;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Plugin directory discovery and `plugin.json` metadata.
pub mod plugins;

/// Caller-level reconnect supervision with backoff.
pub mod supervisor;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// WebSocket transport over tokio-tungstenite.
pub mod websocket;
