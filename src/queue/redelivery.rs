//! What happens to a message once its handler gave up on it.

use std::time::Duration;

use rand::Rng;

use crate::config::QueueConfig;

/// Fate of an abandoned message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Hand the message out again after the delay.
    Redeliver(Duration),
    /// Stop delivering and park the message in the dead-letter list.
    DeadLetter,
}

/// Delivery budget and spacing for one queue.
///
/// The delay before delivery `n + 1` is `base * 2^(n-1)`, capped at the
/// ceiling, plus up to a tenth of itself in jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    base: Duration,
    ceiling: Duration,
    max_delivery_count: u32,
}

impl RedeliveryPolicy {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            base: Duration::from_millis(config.redelivery_base_ms),
            ceiling: Duration::from_millis(config.redelivery_max_ms.max(config.redelivery_base_ms)),
            max_delivery_count: config.max_delivery_count.max(1),
        }
    }

    pub fn max_delivery_count(&self) -> u32 {
        self.max_delivery_count
    }

    /// Decide for a message abandoned after its `delivery_count`-th delivery.
    pub fn disposition(&self, delivery_count: u32) -> Disposition {
        if delivery_count >= self.max_delivery_count {
            Disposition::DeadLetter
        } else {
            Disposition::Redeliver(self.delay(delivery_count))
        }
    }

    fn delay(&self, delivery_count: u32) -> Duration {
        let factor = 1u32
            .checked_shl(delivery_count.saturating_sub(1))
            .unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(factor).min(self.ceiling);

        let spread = delay / 10;
        if spread.is_zero() {
            return delay;
        }
        delay + rand::thread_rng().gen_range(Duration::ZERO..spread)
    }
}
