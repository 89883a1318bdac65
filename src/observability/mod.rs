//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! telemetry.rs (once, at startup)
//!     → tracing subscriber (pretty or JSON, EnvFilter)
//!     → optional Prometheus exporter
//!
//! Every invocation:
//!     → logging.rs (LogEntry snapshot, emitted as one structured event)
//!     → metrics.rs (counters, histograms)
//! ```

pub mod logging;
pub mod metrics;
pub mod telemetry;

pub use logging::{InvocationContext, LogEntry};
