//! Queue transport subsystem.
//!
//! # Data Flow
//! ```text
//! /enqueue handler
//!     → QueueClient::send (fire-and-forget)
//!     → transport (memory.rs: bounded channel)
//!     → worker.rs receives, runs the dequeue handler
//!         ok  → complete
//!         err → abandon → redelivery.rs decides
//!               delay → redeliver, or budget spent → dead-letter
//!         err that can never succeed → reject → dead-letter
//!     shutdown → close → drain what was accepted
//! ```
//!
//! # Design Decisions
//! - Relay code only sees the `QueueClient` trait
//! - At-least-once delivery is owned by the transport, not the handlers
//! - No ordering guarantee across redelivered messages

pub mod memory;
pub mod redelivery;
pub mod worker;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{ConnectionString, QueueConfig};

pub use memory::{Delivery, MemoryQueue, QueueReceiver};
pub use redelivery::{Disposition, RedeliveryPolicy};
pub use worker::QueueWorker;

/// Transport scheme served in-process.
pub const MEMORY_TRANSPORT: &str = "memory";

/// Errors raised by a queue transport.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("queue '{0}' is full")]
    Full(String),

    #[error("invalid queue connection string: {0}")]
    InvalidConnection(String),

    #[error("queue transport '{0}' is not supported")]
    UnsupportedTransport(String),

    #[error("message body is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A message as stored by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: Uuid,
    pub body: String,
    /// Number of times the message has been handed to a consumer.
    pub delivery_count: u32,
    /// Unix time in milliseconds.
    pub enqueued_at: u64,
}

impl QueueMessage {
    pub fn new(body: impl Into<String>) -> Self {
        let enqueued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4(),
            body: body.into(),
            delivery_count: 0,
            enqueued_at,
        }
    }

    /// Serialize `value` as the message body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, QueueError> {
        Ok(Self::new(serde_json::to_string(value)?))
    }
}

/// Producer side of a queue transport.
pub trait QueueClient: Send + Sync {
    fn queue_name(&self) -> &str;

    /// Submit a message. Returns once the transport has accepted it.
    fn send(&self, message: QueueMessage) -> Result<(), QueueError>;
}

/// Open the transport named by the queue connection string.
pub fn connect(config: &QueueConfig) -> Result<(MemoryQueue, QueueReceiver), QueueError> {
    let raw = config
        .connection_string
        .as_deref()
        .ok_or_else(|| QueueError::InvalidConnection("not set".to_string()))?;
    let cs = raw
        .parse::<ConnectionString>()
        .map_err(|e| QueueError::InvalidConnection(e.to_string()))?;

    let endpoint = cs
        .get("Endpoint")
        .ok_or_else(|| QueueError::InvalidConnection("missing Endpoint".to_string()))?;
    let scheme = endpoint.split("://").next().unwrap_or_default();
    if scheme != MEMORY_TRANSPORT {
        return Err(QueueError::UnsupportedTransport(scheme.to_string()));
    }

    let name = cs.get("EntityPath").unwrap_or(&config.queue_name);
    tracing::info!(queue = %name, transport = MEMORY_TRANSPORT, "Queue transport connected");
    Ok(MemoryQueue::channel(name, config))
}
