//! Per-provider request pacing.
//!
//! Each provider gets a single-slot leaky bucket: callers are released one
//! at a time, at most once per `ceil(60_000 / rpm)` ms. Waiters queue on a
//! `tokio::sync::Mutex`, which is FIFO-fair.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::domain::Provider;

struct Bucket {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

/// Explicit, shared rate limiter. Build one per process.
pub struct RateLimiter {
    buckets: HashMap<Provider, Bucket>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let buckets = Provider::ALL
            .into_iter()
            .filter_map(|p| {
                config.interval(p).map(|interval| {
                    (
                        p,
                        Bucket {
                            interval,
                            next_slot: Mutex::new(None),
                        },
                    )
                })
            })
            .collect();
        Self { buckets }
    }

    pub fn unlimited() -> Self {
        Self::new(&RateLimitConfig::unlimited())
    }

    /// Wait until a call to `provider` may be issued.
    pub async fn acquire(&self, provider: Provider) {
        let Some(bucket) = self.buckets.get(&provider) else {
            return;
        };

        let mut next_slot = bucket.next_slot.lock().await;
        let now = Instant::now();
        let slot = match *next_slot {
            Some(at) if at > now => at,
            _ => now,
        };
        if slot > now {
            debug!(provider = %provider, wait_ms = (slot - now).as_millis() as u64, "rate limited");
            tokio::time::sleep_until(slot).await;
        }
        *next_slot = Some(slot + bucket.interval);
    }
}
