//! Explicit telemetry initialization.
//!
//! Called once, before the router starts serving. Sets up the `tracing`
//! subscriber, validates the telemetry connection string and optionally
//! starts the metrics exporter. The returned guard is dropped last during
//! shutdown.

use std::net::SocketAddr;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::validation::TELEMETRY_KEY;
use crate::config::{ConnectionString, LogFormat, TelemetryConfig};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry connection string: {0}")]
    Connection(String),

    #[error("tracing subscriber already installed: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Keeps telemetry alive for the process lifetime.
#[derive(Debug)]
pub struct TelemetryGuard {
    ingestion_endpoint: Option<String>,
}

impl TelemetryGuard {
    pub fn ingestion_endpoint(&self) -> Option<&str> {
        self.ingestion_endpoint.as_deref()
    }

    /// Final step of shutdown. Log output is written synchronously, so this
    /// only marks the end of the stream.
    pub fn shutdown(self) {
        tracing::info!(
            ingestion_endpoint = self.ingestion_endpoint.as_deref().unwrap_or("-"),
            "Telemetry flushed"
        );
    }
}

/// Build the default filter directive for a configured level.
pub fn default_directive(level: &str) -> String {
    format!("trace_relay={level},tower_http={level}")
}

/// Install the global subscriber and the metrics exporter.
pub fn init(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let connection = parse_connection(config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init()?;

    if config.metrics_enabled {
        let addr: SocketAddr = config
            .metrics_address
            .parse()
            .map_err(|_| TelemetryError::MetricsAddress(config.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let guard = TelemetryGuard {
        ingestion_endpoint: connection.get("IngestionEndpoint").map(str::to_string),
    };
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_format = ?config.log_format,
        metrics_enabled = config.metrics_enabled,
        ingestion_endpoint = guard.ingestion_endpoint().unwrap_or("-"),
        "Telemetry initialized"
    );
    Ok(guard)
}

fn parse_connection(config: &TelemetryConfig) -> Result<ConnectionString, TelemetryError> {
    let raw = config
        .connection_string
        .as_deref()
        .ok_or_else(|| TelemetryError::Connection("not set".to_string()))?;
    let connection = raw
        .parse::<ConnectionString>()
        .map_err(|e| TelemetryError::Connection(e.to_string()))?;
    if !connection.contains(TELEMETRY_KEY) {
        return Err(TelemetryError::Connection(format!("missing {}", TELEMETRY_KEY)));
    }
    Ok(connection)
}
