//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → telemetry → queue → listener + worker
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → close queue, drain worker → flush telemetry
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
