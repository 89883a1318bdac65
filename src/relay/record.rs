//! A log entry travelling through the relay, tagged with the stage it reached.
//!
//! The record is the queue message body and the body replayed to `/end`, so
//! the terminal handler can only complete what the worker actually dequeued.

use serde::{Deserialize, Serialize};

use crate::error::RelayResult;
use crate::observability::logging::LogEntry;
use crate::relay::stage::RelayStage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRecord {
    pub stage: RelayStage,
    pub entry: LogEntry,
}

impl RelayRecord {
    /// Record for an entry just handed to the queue.
    pub fn enqueued(entry: LogEntry) -> RelayResult<Self> {
        Ok(Self {
            stage: RelayStage::Received.advance(RelayStage::Enqueued)?,
            entry,
        })
    }

    /// Move the record one stage forward.
    pub fn advance(self, next: RelayStage) -> RelayResult<Self> {
        Ok(Self {
            stage: self.stage.advance(next)?,
            entry: self.entry,
        })
    }
}
