//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, trace layer)
//!     → handlers.rs
//!         /start, /caller  → sanitize → propagate → forward
//!         /headers         → echo the log entry
//!         /enqueue         → queue hand-off
//!         /end             → terminal log
//!     → JSON response (downstream status passed through)
//! ```

pub mod handlers;
pub mod request;
pub mod server;

pub use request::{request_id, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
