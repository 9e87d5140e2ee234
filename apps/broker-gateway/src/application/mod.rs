//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how broker plugins plug into the gateway.

/// Port interfaces for plugins and external systems (transport, metadata).
pub mod ports;

/// Application services for adapters, plugin loading, and the registry.
pub mod services;
