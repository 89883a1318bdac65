//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Require both connection strings and check their mandatory keys
//! - Validate addresses, URLs and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs once, before any subsystem starts

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::connection_string::{ConnectionString, ConnectionStringError};
use crate::config::schema::RelayConfig;
use crate::queue::MEMORY_TRANSPORT;

/// Key required in the telemetry connection string.
pub const TELEMETRY_KEY: &str = "InstrumentationKey";
/// Key required in the queue connection string.
pub const QUEUE_ENDPOINT_KEY: &str = "Endpoint";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is not set")]
    MissingConnectionString { field: &'static str },

    #[error("{field} is malformed: {source}")]
    MalformedConnectionString {
        field: &'static str,
        source: ConnectionStringError,
    },

    #[error("{field} has no '{key}' entry")]
    MissingKey { field: &'static str, key: &'static str },

    #[error("queue transport '{0}' is not supported")]
    UnsupportedTransport(String),

    #[error("{field} '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("downstream.base_url '{value}': {reason}")]
    InvalidDownstream { value: String, reason: String },

    #[error("server.route_prefix '{0}' must be empty or start with '/'")]
    InvalidRoutePrefix(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a fully merged configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(cs) = required_connection_string(
        "telemetry.connection_string",
        config.telemetry.connection_string.as_deref(),
        &mut errors,
    ) {
        if !cs.contains(TELEMETRY_KEY) {
            errors.push(ValidationError::MissingKey {
                field: "telemetry.connection_string",
                key: TELEMETRY_KEY,
            });
        }
    }

    if let Some(cs) = required_connection_string(
        "queue.connection_string",
        config.queue.connection_string.as_deref(),
        &mut errors,
    ) {
        match cs.get(QUEUE_ENDPOINT_KEY) {
            None => errors.push(ValidationError::MissingKey {
                field: "queue.connection_string",
                key: QUEUE_ENDPOINT_KEY,
            }),
            Some(endpoint) => {
                let scheme = endpoint.split("://").next().unwrap_or_default();
                if scheme != MEMORY_TRANSPORT {
                    errors.push(ValidationError::UnsupportedTransport(scheme.to_string()));
                }
            }
        }
    }

    check_address("server.bind_address", &config.server.bind_address, &mut errors);
    if config.telemetry.metrics_enabled {
        check_address("telemetry.metrics_address", &config.telemetry.metrics_address, &mut errors);
    }

    match Url::parse(&config.downstream.base_url) {
        Ok(url) if !matches!(url.scheme(), "http" | "https") => {
            errors.push(ValidationError::InvalidDownstream {
                value: config.downstream.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidDownstream {
            value: config.downstream.base_url.clone(),
            reason: e.to_string(),
        }),
    }

    let prefix = &config.server.route_prefix;
    if !prefix.is_empty() && !prefix.starts_with('/') {
        errors.push(ValidationError::InvalidRoutePrefix(prefix.clone()));
    }

    if config.queue.capacity == 0 {
        errors.push(ValidationError::Zero("queue.capacity"));
    }
    if config.queue.max_delivery_count == 0 {
        errors.push(ValidationError::Zero("queue.max_delivery_count"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn required_connection_string(
    field: &'static str,
    value: Option<&str>,
    errors: &mut Vec<ValidationError>,
) -> Option<ConnectionString> {
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        errors.push(ValidationError::MissingConnectionString { field });
        return None;
    };

    match value.parse() {
        Ok(cs) => Some(cs),
        Err(source) => {
            errors.push(ValidationError::MalformedConnectionString { field, source });
            None
        }
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.telemetry.connection_string = Some("InstrumentationKey=abc".to_string());
        config.queue.connection_string = Some("Endpoint=memory://local".to_string());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_connection_strings_fail_fast() {
        let errors = validate_config(&RelayConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingConnectionString {
            field: "telemetry.connection_string"
        }));
        assert!(errors.contains(&ValidationError::MissingConnectionString {
            field: "queue.connection_string"
        }));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = valid_config();
        config.telemetry.connection_string = Some("IngestionEndpoint=https://x".to_string());
        config.queue.connection_string = Some("Endpoint=sb://bus.example.net/".to_string());
        config.server.bind_address = "nowhere".to_string();
        config.downstream.base_url = "ftp://files".to_string();
        config.queue.capacity = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5, "{:?}", errors);
        assert!(errors.contains(&ValidationError::UnsupportedTransport("sb".to_string())));
    }

    #[test]
    fn test_route_prefix() {
        let mut config = valid_config();
        config.server.route_prefix = "api".to_string();
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidRoutePrefix("api".to_string())]
        );

        config.server.route_prefix = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
