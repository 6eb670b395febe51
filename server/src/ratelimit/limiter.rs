//! In-memory token bucket keyed by actor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tierward_common::Actor;
use tokio::sync::RwLock;

use super::RateLimitError;

/// Commands per second allowed per actor by default.
pub const DEFAULT_RATE_PER_SECOND: u32 = 3;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket per actor.
///
/// Each actor may burst up to `rate` commands and regains `rate` tokens per
/// second. A rate of zero disables limiting.
#[derive(Debug, Clone)]
pub struct ActorRateLimiter {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
    rate: u32,
}

impl ActorRateLimiter {
    pub fn new(rate_per_second: u32) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            rate: rate_per_second,
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.rate > 0
    }

    pub const fn rate(&self) -> u32 {
        self.rate
    }

    /// Take one token for `actor`.
    pub async fn check(&self, actor: &Actor) -> Result<(), RateLimitError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let capacity = f64::from(self.rate);
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        let bucket = buckets.entry(actor.to_string()).or_insert(Bucket {
            tokens: capacity,
            refilled_at: now,
        });

        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * capacity).min(capacity);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - bucket.tokens;
            Err(RateLimitError::Exceeded {
                retry_after: Duration::from_secs_f64(missing / capacity),
            })
        }
    }

    /// Drop buckets that have been full for a while.
    pub async fn cleanup(&self) {
        let idle = Duration::from_secs(60);
        let mut buckets = self.buckets.write().await;
        buckets.retain(|_, bucket| bucket.refilled_at.elapsed() < idle);
    }
}

impl Default for ActorRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_PER_SECOND)
    }
}
