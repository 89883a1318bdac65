//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Telemetry sink connection string.
pub const ENV_TELEMETRY_CONNECTION: &str = "APPLICATIONINSIGHTS_CONNECTION_STRING";
/// Queue transport connection string.
pub const ENV_QUEUE_CONNECTION: &str = "SERVICEBUS_CONNECTION";
/// Downstream base URL override.
pub const ENV_DOWNSTREAM_URL: &str = "RELAY_DOWNSTREAM_URL";
/// Listener address override.
pub const ENV_BIND_ADDRESS: &str = "RELAY_BIND_ADDRESS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, merge and validate configuration.
///
/// Defaults are overlaid by the optional TOML file, then by the process
/// environment, then by an explicit bind address from the command line.
pub fn load_config(path: Option<&Path>, bind: Option<&str>) -> Result<RelayConfig, ConfigError> {
    let config = match path {
        Some(path) => parse_file(path)?,
        None => RelayConfig::default(),
    };
    finish(config, bind, |key| std::env::var(key).ok())
}

/// Apply environment overrides through `lookup`, then `bind`, and validate.
pub fn finish<F>(
    mut config: RelayConfig,
    bind: Option<&str>,
    lookup: F,
) -> Result<RelayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    apply_env(&mut config, lookup);
    if let Some(bind) = bind {
        config.server.bind_address = bind.to_string();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

fn apply_env<F>(config: &mut RelayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_TELEMETRY_CONNECTION) {
        config.telemetry.connection_string = Some(value);
    }
    if let Some(value) = lookup(ENV_QUEUE_CONNECTION) {
        config.queue.connection_string = Some(value);
    }
    if let Some(value) = lookup(ENV_DOWNSTREAM_URL) {
        config.downstream.base_url = value;
    }
    if let Some(value) = lookup(ENV_BIND_ADDRESS) {
        config.server.bind_address = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_environment_supplies_connection_strings() {
        let config = finish(
            RelayConfig::default(),
            None,
            env(&[
                (ENV_TELEMETRY_CONNECTION, "InstrumentationKey=abc"),
                (ENV_QUEUE_CONNECTION, "Endpoint=memory://local;EntityPath=jobs"),
                (ENV_DOWNSTREAM_URL, "https://downstream.example.net"),
            ]),
        )
        .unwrap();

        assert_eq!(config.telemetry.connection_string.as_deref(), Some("InstrumentationKey=abc"));
        assert_eq!(config.downstream.base_url, "https://downstream.example.net");
    }

    #[test]
    fn test_missing_environment_is_configuration_error() {
        let err = finish(RelayConfig::default(), None, env(&[])).unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut config: RelayConfig = toml::from_str(
            r#"
            [server]
            bind_address = "127.0.0.1:1"

            [telemetry]
            connection_string = "InstrumentationKey=from-file"

            [queue]
            connection_string = "Endpoint=memory://file"
            "#,
        )
        .unwrap();
        let from_env = finish(config.clone(), None, env(&[(ENV_BIND_ADDRESS, "127.0.0.1:2")])).unwrap();
        assert_eq!(from_env.server.bind_address, "127.0.0.1:2");

        config = finish(config, Some("127.0.0.1:3"), env(&[(ENV_BIND_ADDRESS, "127.0.0.1:2")])).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:3");
        assert_eq!(
            config.telemetry.connection_string.as_deref(),
            Some("InstrumentationKey=from-file")
        );
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
