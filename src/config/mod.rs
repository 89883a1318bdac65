//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (connection strings, downstream, bind)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is loaded once at process start; there is no hot reload
//! - All fields have defaults except the two connection strings
//! - Validation separates syntactic (serde) from semantic checks

pub mod connection_string;
pub mod loader;
pub mod schema;
pub mod validation;

pub use connection_string::ConnectionString;
pub use loader::{load_config, ConfigError};
pub use schema::{
    DownstreamConfig, LogFormat, QueueConfig, RelayConfig, ServerConfig, TelemetryConfig,
    TraceConfig, TraceMode,
};
