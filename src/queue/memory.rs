//! In-process queue transport.
//!
//! # Responsibilities
//! - Hold submitted messages in a bounded channel
//! - Count deliveries and redeliver abandoned messages per [`RedeliveryPolicy`]
//! - Dead-letter messages that run out of deliveries or can never succeed
//! - Close for shutdown while still handing out what was already accepted

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::QueueConfig;
use crate::observability::metrics;
use crate::queue::redelivery::{Disposition, RedeliveryPolicy};
use crate::queue::{QueueClient, QueueError, QueueMessage};

type DeadLetters = Arc<Mutex<Vec<QueueMessage>>>;

/// Producer handle of the in-process transport.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    name: String,
    tx: mpsc::Sender<QueueMessage>,
    dead_letters: DeadLetters,
}

/// Consumer handle of the in-process transport.
#[derive(Debug)]
pub struct QueueReceiver {
    name: String,
    rx: mpsc::Receiver<QueueMessage>,
    redeliver: mpsc::WeakSender<QueueMessage>,
    dead_letters: DeadLetters,
    policy: RedeliveryPolicy,
    drain_timeout: Duration,
}

/// A message handed to a consumer, to be completed, abandoned or rejected.
#[derive(Debug)]
pub struct Delivery {
    pub message: QueueMessage,
}

impl MemoryQueue {
    /// Create a connected producer / consumer pair.
    pub fn channel(name: &str, config: &QueueConfig) -> (MemoryQueue, QueueReceiver) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let dead_letters: DeadLetters = Arc::default();

        let receiver = QueueReceiver {
            name: name.to_string(),
            rx,
            redeliver: tx.downgrade(),
            dead_letters: dead_letters.clone(),
            policy: RedeliveryPolicy::new(config),
            drain_timeout: Duration::from_millis(config.drain_timeout_ms),
        };
        let queue = MemoryQueue {
            name: name.to_string(),
            tx,
            dead_letters,
        };
        (queue, receiver)
    }

    /// Snapshot of dead-lettered messages.
    pub fn dead_letters(&self) -> Vec<QueueMessage> {
        lock(&self.dead_letters).clone()
    }
}

impl QueueClient for MemoryQueue {
    fn queue_name(&self) -> &str {
        &self.name
    }

    fn send(&self, message: QueueMessage) -> Result<(), QueueError> {
        let id = message.id;
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full(self.name.clone()),
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;

        metrics::record_enqueued(&self.name);
        tracing::debug!(queue = %self.name, message_id = %id, "Message enqueued");
        Ok(())
    }
}

impl QueueReceiver {
    pub fn queue_name(&self) -> &str {
        &self.name
    }

    /// Upper bound on the shutdown drain.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Wait for the next message. `None` once the queue is closed and empty,
    /// or every producer is gone.
    pub async fn receive(&mut self) -> Option<Delivery> {
        let mut message = self.rx.recv().await?;
        message.delivery_count += 1;
        Some(Delivery { message })
    }

    /// Refuse new messages. Messages already accepted are still received.
    pub fn close(&mut self) {
        self.rx.close();
        tracing::info!(queue = %self.name, "Queue closed to new messages");
    }

    /// Acknowledge a handled message.
    pub fn complete(&self, delivery: Delivery) {
        metrics::record_delivered(&self.name, "completed");
        tracing::debug!(
            queue = %self.name,
            message_id = %delivery.message.id,
            delivery_count = delivery.message.delivery_count,
            "Message completed"
        );
    }

    /// Return a failed message to the queue, or dead-letter it once its
    /// deliveries are used up.
    pub fn abandon(&self, delivery: Delivery) {
        let message = delivery.message;
        metrics::record_delivered(&self.name, "abandoned");

        let delay = match self.policy.disposition(message.delivery_count) {
            Disposition::DeadLetter => {
                self.dead_letter(message, "delivery limit reached");
                return;
            }
            Disposition::Redeliver(delay) => delay,
        };

        let Some(tx) = self.redeliver.upgrade() else {
            self.dead_letter(message, "queue closed before redelivery");
            return;
        };

        tracing::info!(
            queue = %self.name,
            message_id = %message.id,
            delivery_count = message.delivery_count,
            max_delivery_count = self.policy.max_delivery_count(),
            delay = ?delay,
            "Scheduling redelivery"
        );

        let name = self.name.clone();
        let dead_letters = self.dead_letters.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(mpsc::error::SendError(message)) = tx.send(message).await {
                park(&name, &dead_letters, message, "queue closed before redelivery");
            }
        });
    }

    /// Dead-letter a message whose handler failed in a way no redelivery
    /// can fix.
    pub fn reject(&self, delivery: Delivery, reason: &str) {
        metrics::record_delivered(&self.name, "rejected");
        self.dead_letter(delivery.message, reason);
    }

    /// Dead-letter everything still buffered. Returns how many were moved.
    pub fn dead_letter_remaining(&mut self) -> usize {
        let mut moved = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.dead_letter(message, "shutdown drain timed out");
            moved += 1;
        }
        moved
    }

    fn dead_letter(&self, message: QueueMessage, reason: &str) {
        park(&self.name, &self.dead_letters, message, reason);
    }
}

fn park(queue: &str, dead_letters: &DeadLetters, message: QueueMessage, reason: &str) {
    tracing::error!(
        queue = %queue,
        message_id = %message.id,
        delivery_count = message.delivery_count,
        reason = %reason,
        "Dead-lettering message"
    );
    metrics::record_dead_lettered(queue);
    lock(dead_letters).push(message);
}

fn lock(dead_letters: &DeadLetters) -> std::sync::MutexGuard<'_, Vec<QueueMessage>> {
    // A poisoned list is still a valid list.
    dead_letters.lock().unwrap_or_else(|e| e.into_inner())
}
