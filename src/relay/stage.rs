//! Lifecycle of a message through the three-stage relay.
//!
//! ```text
//! Received → Enqueued → Dequeued → Completed
//! ```
//!
//! `Completed` is only reachable after the queue transport delivers the
//! message back to the terminal handler. Nothing compensates for a message
//! that is never delivered.

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStage {
    Received,
    Enqueued,
    Dequeued,
    Completed,
}

impl RelayStage {
    /// Move to `next`, rejecting anything but the single forward step.
    pub fn advance(self, next: RelayStage) -> RelayResult<RelayStage> {
        let allowed = matches!(
            (self, next),
            (RelayStage::Received, RelayStage::Enqueued)
                | (RelayStage::Enqueued, RelayStage::Dequeued)
                | (RelayStage::Dequeued, RelayStage::Completed)
        );

        if allowed {
            tracing::debug!(from = ?self, to = ?next, "Relay stage advanced");
            Ok(next)
        } else {
            Err(RelayError::InvalidTransition { from: self, to: next })
        }
    }

    pub fn is_terminal(self) -> bool {
        self == RelayStage::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let stage = RelayStage::Received
            .advance(RelayStage::Enqueued)
            .and_then(|s| s.advance(RelayStage::Dequeued))
            .and_then(|s| s.advance(RelayStage::Completed))
            .unwrap();
        assert!(stage.is_terminal());
    }

    #[test]
    fn test_rejects_skips_and_reversals() {
        assert!(RelayStage::Received.advance(RelayStage::Completed).is_err());
        assert!(RelayStage::Received.advance(RelayStage::Dequeued).is_err());
        assert!(RelayStage::Dequeued.advance(RelayStage::Enqueued).is_err());
        assert!(RelayStage::Completed.advance(RelayStage::Received).is_err());
        assert!(RelayStage::Enqueued.advance(RelayStage::Enqueued).is_err());
    }
}
