//! Gateway Configuration Settings
//!
//! Configuration types for the broker gateway, loaded from environment
//! variables. Numeric values that fail to parse fall back to their defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::AdapterSettings;
use crate::domain::plugin::ActivationPolicy;

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Backoff settings for adapter supervisors.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub initial_delay: Duration,
    /// Maximum reconnection delay.
    pub max_delay: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 0, // Unlimited
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Directory holding one sub-directory per broker plugin.
    pub plugin_dir: PathBuf,
    /// Plugin activation overrides.
    pub activation: ActivationPolicy,
    /// Server port settings.
    pub server: ServerSettings,
    /// Streaming adapter timeouts and buffers.
    pub streaming: AdapterSettings,
    /// Supervisor backoff.
    pub reconnect: ReconnectSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from("plugins"),
            activation: ActivationPolicy::default(),
            server: ServerSettings::default(),
            streaming: AdapterSettings::default(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unusable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Env(&lookup);

        let plugin_dir = match lookup("BROKER_PLUGIN_DIR") {
            Some(dir) if dir.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("BROKER_PLUGIN_DIR".to_string()));
            }
            Some(dir) => PathBuf::from(dir.trim()),
            None => defaults.plugin_dir,
        };

        let activation = ActivationPolicy::new(
            lookup("ENABLE_INDIAN_BROKERS")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
        );

        let server = ServerSettings {
            health_port: env.parse("GATEWAY_HEALTH_PORT", defaults.server.health_port),
        };

        let streaming = AdapterSettings {
            connect_timeout: env.millis(
                "GATEWAY_CONNECT_TIMEOUT_MS",
                defaults.streaming.connect_timeout,
            ),
            request_timeout: env.millis(
                "GATEWAY_REQUEST_TIMEOUT_MS",
                defaults.streaming.request_timeout,
            ),
            event_capacity: env.parse(
                "GATEWAY_EVENT_CHANNEL_CAPACITY",
                defaults.streaming.event_capacity,
            ),
        };
        if streaming.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GATEWAY_EVENT_CHANNEL_CAPACITY".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let reconnect = ReconnectSettings {
            initial_delay: env.millis(
                "GATEWAY_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect.initial_delay,
            ),
            max_delay: env.secs(
                "GATEWAY_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect.max_delay,
            ),
            multiplier: env.parse(
                "GATEWAY_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect.multiplier,
            ),
            max_attempts: env.parse(
                "GATEWAY_MAX_RECONNECT_ATTEMPTS",
                defaults.reconnect.max_attempts,
            ),
        };

        Ok(Self {
            plugin_dir,
            activation,
            server,
            streaming,
            reconnect,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),

    /// Environment variable holds a value that cannot be used.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Plugin metadata exists but could not be read.
    #[error("cannot read plugin metadata {path}: {reason}")]
    MetadataUnreadable {
        /// Metadata file.
        path: PathBuf,
        /// I/O error.
        reason: String,
    },

    /// Plugin metadata is not valid JSON of the expected shape.
    #[error("malformed plugin metadata {path}: {reason}")]
    MetadataMalformed {
        /// Metadata file.
        path: PathBuf,
        /// Parse error.
        reason: String,
    },
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }
}
