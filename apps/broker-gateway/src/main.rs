//! Broker Gateway Binary
//!
//! Loads the broker plugin registry and serves health and metrics.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin broker-gateway
//! ```
//!
//! # Environment Variables
//!
//! - `BROKER_PLUGIN_DIR`: Plugin directory (default: plugins)
//! - `ENABLE_INDIAN_BROKERS`: "true" activates disabled Indian broker plugins
//! - `GATEWAY_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log level (default: info)
//!
//! The adapter and reconnect variables (`GATEWAY_CONNECT_TIMEOUT_MS`,
//! `GATEWAY_REQUEST_TIMEOUT_MS`, `GATEWAY_EVENT_CHANNEL_CAPACITY`,
//! `GATEWAY_RECONNECT_*`, `GATEWAY_MAX_RECONNECT_ATTEMPTS`) are parsed and
//! logged at startup, but this binary opens no broker streams. They take
//! effect in callers that build adapters and supervisors from
//! `GatewayConfig::streaming` and `GatewayConfig::reconnect`.
//!
//! Sending `SIGHUP` rescans the plugin directory and replaces the registry.

use std::sync::Arc;
use std::time::Duration;

use broker_gateway::application::services::{BrokerRegistry, PluginCatalog, PluginLoader};
use broker_gateway::{
    AdapterDirectory, FsDescriptorSource, GatewayConfig, HealthServer, HealthServerState,
    SharedRegistry, builtin_catalog, discover_candidates, init_metrics, init_telemetry,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "rustls crypto provider already installed")?;

    load_dotenv();

    let _telemetry_guard = init_telemetry();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Broker Gateway");

    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let catalog = Arc::new(builtin_catalog());

    let registry = Arc::new(SharedRegistry::new(load_registry(&config, &catalog)));
    let adapters = Arc::new(AdapterDirectory::new());

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&registry),
        Arc::clone(&adapters),
    ));
    health_state.mark_ready();

    let health_server = HealthServer::new(
        config.server.health_port,
        Arc::clone(&health_state),
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(
        config.clone(),
        Arc::clone(&catalog),
        Arc::clone(&registry),
        shutdown_token.clone(),
    ));

    tracing::info!(brokers = registry.current().len(), "Broker gateway ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Broker gateway stopped");
    Ok(())
}

/// Discover, activate, and resolve plugins.
fn load_registry(config: &GatewayConfig, catalog: &PluginCatalog) -> BrokerRegistry {
    let descriptors = FsDescriptorSource::new(&config.plugin_dir);
    let candidates = discover_candidates(&config.plugin_dir, catalog);

    let outcome = PluginLoader::new(catalog, &descriptors, config.activation).load_all(candidates);
    for failure in &outcome.failures {
        tracing::warn!(broker = failure.broker(), error = %failure, "Broker plugin unavailable");
    }
    outcome.registry
}

/// Rebuild the registry whenever the process receives `SIGHUP`.
#[cfg(unix)]
async fn reload_on_hangup(
    config: GatewayConfig,
    catalog: Arc<PluginCatalog>,
    registry: Arc<SharedRegistry>,
    cancel: CancellationToken,
) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "SIGHUP handler unavailable, registry reload disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                tracing::info!("Received SIGHUP, reloading broker plugins");
                registry.replace(load_registry(&config, &catalog));
            }
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        plugin_dir = %config.plugin_dir.display(),
        enable_indian_brokers = config.activation.enable_indian_brokers,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        connect_timeout_ms = config.streaming.connect_timeout.as_millis(),
        request_timeout_ms = config.streaming.request_timeout.as_millis(),
        event_capacity = config.streaming.event_capacity,
        max_reconnect_attempts = config.reconnect.max_attempts,
        "Adapter settings (applied by library callers)"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
