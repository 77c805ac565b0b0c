//! Per-vendor token bucket rate limiting
//!
//! One bucket per vendor, shared by every campaign of that vendor, so
//! concurrent campaigns draw from the same budget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::trace;
use whatsjet_common::config::DispatchConfig;
use whatsjet_common::types::VendorId;

/// Token bucket rate limiter
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: u32) -> Self {
        let cap = capacity.max(1) as f64;
        Self {
            capacity: cap,
            tokens: cap,
            refill_per_sec: refill_per_sec.max(1) as f64,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    pub fn try_take(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until the next token is available
    pub fn time_to_next(&self) -> Duration {
        let missing = (1.0 - self.tokens).max(0.0);
        Duration::from_secs_f64(missing / self.refill_per_sec)
    }
}

/// Registry of per-vendor buckets, local to this process
pub struct VendorRateLimiter {
    buckets: RwLock<HashMap<VendorId, Arc<Mutex<TokenBucket>>>>,
    capacity: u32,
    refill_per_sec: u32,
}

impl VendorRateLimiter {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            capacity: config.burst,
            refill_per_sec: config.rate_per_second,
        }
    }

    async fn bucket(&self, vendor_id: VendorId) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.read().await.get(&vendor_id) {
            return bucket.clone();
        }

        let mut guard = self.buckets.write().await;
        guard
            .entry(vendor_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(TokenBucket::new(
                    self.capacity,
                    self.refill_per_sec,
                )))
            })
            .clone()
    }

    /// Take a token without waiting
    pub async fn try_acquire(&self, vendor_id: VendorId) -> bool {
        let bucket = self.bucket(vendor_id).await;
        let mut bucket = bucket.lock().await;
        bucket.try_take()
    }

    /// Wait until a token is available for `vendor_id`, then take it
    pub async fn acquire(&self, vendor_id: VendorId) {
        let bucket = self.bucket(vendor_id).await;
        loop {
            let wait = {
                let mut bucket = bucket.lock().await;
                if bucket.try_take() {
                    return;
                }
                bucket.time_to_next()
            };
            trace!(vendor_id = %vendor_id, wait_ms = wait.as_millis() as u64, "Rate limited");
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn config(rate: u32, burst: u32) -> DispatchConfig {
        DispatchConfig {
            rate_per_second: rate,
            burst,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_allows_burst_then_refills() {
        let mut bucket = TokenBucket::new(3, 1);
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(!bucket.try_take());

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(bucket.try_take());
        assert!(!bucket.try_take());
    }

    #[tokio::test(start_paused = true)]
    async fn test_vendor_bucket_is_shared() {
        let limiter = VendorRateLimiter::new(&config(1, 2));
        let vendor = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(limiter.try_acquire(vendor).await);
        assert!(limiter.try_acquire(vendor).await);
        assert!(!limiter.try_acquire(vendor).await);
        assert!(limiter.try_acquire(other).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = VendorRateLimiter::new(&config(10, 1));
        let vendor = Uuid::new_v4();

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(vendor).await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(190), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(400), "{:?}", elapsed);
    }
}
