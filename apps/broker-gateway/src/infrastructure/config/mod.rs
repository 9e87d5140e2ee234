//! Configuration Module
//!
//! Configuration loading for the broker gateway.

mod settings;

pub use settings::{ConfigError, GatewayConfig, ReconnectSettings, ServerSettings};
