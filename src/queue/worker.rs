//! Queue consumer loop.
//!
//! Runs in two phases. Until shutdown it consumes as messages arrive. On
//! shutdown the queue is closed to new messages and everything it already
//! accepted is handled, bounded by the receiver's drain timeout. What is
//! still buffered when the timeout expires is dead-lettered, never dropped.

use std::future::Future;

use tokio::sync::broadcast;

use crate::error::RelayResult;
use crate::queue::{Delivery, QueueMessage, QueueReceiver};

/// Pulls messages off a receiver and runs a handler for each.
pub struct QueueWorker {
    receiver: QueueReceiver,
}

impl QueueWorker {
    pub fn new(receiver: QueueReceiver) -> Self {
        Self { receiver }
    }

    /// Consume until shutdown is signalled, then drain.
    pub async fn run<F, Fut>(mut self, handler: F, mut shutdown: broadcast::Receiver<()>)
    where
        F: Fn(QueueMessage) -> Fut,
        Fut: Future<Output = RelayResult<()>>,
    {
        tracing::info!(queue = %self.receiver.queue_name(), "Queue worker started");

        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                delivery = self.receiver.receive() => match delivery {
                    Some(d) => d,
                    None => {
                        tracing::info!(queue = %self.receiver.queue_name(), "Queue worker stopped");
                        return;
                    }
                },
            };
            self.handle(&handler, delivery).await;
        }

        self.drain(&handler).await;
        tracing::info!(queue = %self.receiver.queue_name(), "Queue worker stopped");
    }

    async fn drain<F, Fut>(&mut self, handler: &F)
    where
        F: Fn(QueueMessage) -> Fut,
        Fut: Future<Output = RelayResult<()>>,
    {
        self.receiver.close();
        let timeout = self.receiver.drain_timeout();
        tracing::info!(
            queue = %self.receiver.queue_name(),
            timeout = ?timeout,
            "Draining accepted messages"
        );

        let mut in_flight: Option<QueueMessage> = None;
        let drained = tokio::time::timeout(timeout, async {
            let mut handled = 0usize;
            while let Some(delivery) = self.receiver.receive().await {
                in_flight = Some(delivery.message.clone());
                self.handle(handler, delivery).await;
                in_flight = None;
                handled += 1;
            }
            handled
        })
        .await;

        match drained {
            Ok(handled) => {
                tracing::info!(queue = %self.receiver.queue_name(), handled, "Queue drained")
            }
            Err(_) => {
                if let Some(message) = in_flight.take() {
                    self.receiver
                        .reject(Delivery { message }, "interrupted by shutdown drain timeout");
                }
                let parked = self.receiver.dead_letter_remaining();
                tracing::warn!(
                    queue = %self.receiver.queue_name(),
                    parked,
                    "Drain timed out, remaining messages dead-lettered"
                );
            }
        }
    }

    async fn handle<F, Fut>(&self, handler: &F, delivery: Delivery)
    where
        F: Fn(QueueMessage) -> Fut,
        Fut: Future<Output = RelayResult<()>>,
    {
        let message_id = delivery.message.id;
        match handler(delivery.message.clone()).await {
            Ok(()) => self.receiver.complete(delivery),
            Err(e) => {
                tracing::error!(
                    queue = %self.receiver.queue_name(),
                    message_id = %message_id,
                    delivery_count = delivery.message.delivery_count,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Message handler failed"
                );
                if e.is_retryable() {
                    self.receiver.abandon(delivery);
                } else {
                    self.receiver.reject(delivery, &e.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::StatusCode;

    use crate::config::QueueConfig;
    use crate::error::RelayError;
    use crate::lifecycle::Shutdown;
    use crate::queue::{MemoryQueue, QueueClient};

    fn config() -> QueueConfig {
        QueueConfig {
            redelivery_base_ms: 1,
            redelivery_max_ms: 5,
            ..QueueConfig::default()
        }
    }

    async fn wait_for(calls: &AtomicU32, expected: u32) {
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_worker_retries_failed_handler() {
        let (queue, receiver) = MemoryQueue::channel("new", &config());
        let shutdown = Shutdown::new();
        let calls = Arc::new(AtomicU32::new(0));

        let c = calls.clone();
        let worker = tokio::spawn(QueueWorker::new(receiver).run(
            move |message: QueueMessage| {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(RelayError::DownstreamStatus {
                            status: StatusCode::SERVICE_UNAVAILABLE,
                            reason: "Service Unavailable".into(),
                        })
                    } else {
                        assert_eq!(message.delivery_count, 2);
                        Ok(())
                    }
                }
            },
            shutdown.subscribe(),
        ));

        queue.send(QueueMessage::new("{}")).unwrap();
        wait_for(&calls, 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(queue.dead_letters().is_empty());

        shutdown.trigger();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_rejects_unrecoverable_message() {
        let (queue, receiver) = MemoryQueue::channel("new", &config());
        let shutdown = Shutdown::new();
        let calls = Arc::new(AtomicU32::new(0));

        let c = calls.clone();
        let worker = tokio::spawn(QueueWorker::new(receiver).run(
            move |_message: QueueMessage| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(RelayError::MissingTraceContext { header: "traceparent" }) }
            },
            shutdown.subscribe(),
        ));

        queue.send(QueueMessage::new("{}")).unwrap();
        wait_for(&calls, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].delivery_count, 1);

        shutdown.trigger();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_accepted_messages() {
        let (queue, receiver) = MemoryQueue::channel("new", &config());
        let shutdown = Shutdown::new();
        let handled = Arc::new(AtomicU32::new(0));

        let h = handled.clone();
        let worker = tokio::spawn(QueueWorker::new(receiver).run(
            move |_message: QueueMessage| {
                let h = h.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            shutdown.subscribe(),
        ));

        for _ in 0..5 {
            queue.send(QueueMessage::new("{}")).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();
        worker.await.unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 5);
        assert!(queue.dead_letters().is_empty());
        assert!(matches!(
            queue.send(QueueMessage::new("{}")),
            Err(crate::queue::QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_drain_timeout_dead_letters_the_rest() {
        let config = QueueConfig {
            drain_timeout_ms: 50,
            ..config()
        };
        let (queue, receiver) = MemoryQueue::channel("new", &config);
        let shutdown = Shutdown::new();
        let handled = Arc::new(AtomicU32::new(0));

        let h = handled.clone();
        let worker = tokio::spawn(QueueWorker::new(receiver).run(
            move |_message: QueueMessage| {
                let h = h.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            shutdown.subscribe(),
        ));

        for _ in 0..6 {
            queue.send(QueueMessage::new("{}")).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        shutdown.trigger();
        worker.await.unwrap();

        let handled = handled.load(Ordering::SeqCst) as usize;
        let parked = queue.dead_letters().len();
        assert!(handled < 6);
        assert!(parked > 0);
        assert_eq!(handled + parked, 6, "handled {} parked {}", handled, parked);
    }
}
