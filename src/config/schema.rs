//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Inbound HTTP listener.
    pub server: ServerConfig,

    /// Downstream relay targets.
    pub downstream: DownstreamConfig,

    /// Trace context handling.
    pub trace: TraceConfig,

    /// Queue transport.
    pub queue: QueueConfig,

    /// Logging, metrics and the telemetry sink.
    pub telemetry: TelemetryConfig,
}

/// Inbound listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:7071").
    pub bind_address: String,

    /// Prefix every relay route is mounted under.
    pub route_prefix: String,

    /// Largest inbound body the relay will buffer, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7071".to_string(),
            route_prefix: "/api".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Downstream endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Scheme and authority of the downstream host.
    pub base_url: String,

    /// Path relayed to by `/start`.
    pub headers_path: String,

    /// Path relayed to by `/caller`.
    pub enqueue_path: String,

    /// Path the queue worker replays messages to.
    pub end_path: String,
}

impl DownstreamConfig {
    /// Join the base URL with one of the configured paths.
    pub fn target(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7071".to_string(),
            headers_path: "/api/headers".to_string(),
            enqueue_path: "/api/enqueue".to_string(),
            end_path: "/api/end".to_string(),
        }
    }
}

/// How a request without `traceparent` is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    /// Reject with 406.
    #[default]
    Strict,
    /// Generate a new context.
    Synthesize,
}

/// Trace context configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TraceConfig {
    pub mode: TraceMode,

    /// Query parameter carrying the external correlation id.
    pub correlation_query_param: String,

    /// Header carrying the external correlation id.
    pub correlation_header: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            mode: TraceMode::Strict,
            correlation_query_param: "correlation-id".to_string(),
            correlation_header: "x-operation-id".to_string(),
        }
    }
}

/// Queue transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// `Endpoint=<scheme>://...;EntityPath=<queue>`; required.
    pub connection_string: Option<String>,

    pub queue_name: String,

    /// Maximum number of undelivered messages held by the transport.
    pub capacity: usize,

    /// Deliveries attempted before a message is dead-lettered.
    pub max_delivery_count: u32,

    /// Base delay for redelivery backoff in milliseconds.
    pub redelivery_base_ms: u64,

    /// Maximum delay for redelivery backoff in milliseconds.
    pub redelivery_max_ms: u64,

    /// How long shutdown waits for accepted messages to be handled.
    pub drain_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            queue_name: "new".to_string(),
            capacity: 1024,
            max_delivery_count: 10,
            redelivery_base_ms: 100,
            redelivery_max_ms: 5000,
            drain_timeout_ms: 5000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `InstrumentationKey=...;IngestionEndpoint=...`; required.
    pub connection_string: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
