//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! inbound headers
//!     → sanitize.rs (drop credentials, force JSON)
//!     → propagate.rs (validate / repair traceparent, legacy pair)
//!     → forward.rs (scheme check, one outbound call)
//!     → downstream status + body back to the caller
//!
//! Queued variant:
//!     record.rs carries the entry on the queue and to /end
//!     stage.rs tracks Received → Enqueued → Dequeued → Completed
//! ```

pub mod forward;
pub mod propagate;
pub mod record;
pub mod sanitize;
pub mod stage;

pub use forward::{Forwarder, RelayEnvelope, RelayResponse, Scheme};
pub use propagate::{resolve_correlation_id, Propagator, Reconciliation, TraceContext};
pub use record::RelayRecord;
pub use sanitize::sanitize;
pub use stage::RelayStage;
