//! Token-bucket throttling for hosted embedding providers.
//!
//! A bucket holds up to `capacity` tokens and refills continuously at
//! `capacity` per minute. Refill is lazy: it is computed from the elapsed
//! time whenever the bucket is touched, so no background task is needed.
//! Callers that find the bucket short sleep for exactly the deficit.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// A lazily refilled token bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket that refills `per_minute` tokens every minute.
    pub fn per_minute(per_minute: u32) -> Self {
        let capacity = f64::from(per_minute.max(1));
        Self {
            capacity,
            refill_rate: capacity / 60.0,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Consume `cost` tokens if they are available right now.
    pub fn try_acquire(&mut self, cost: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Time until `cost` tokens will be available. Zero if they already are.
    pub fn wait_time(&mut self, cost: f64, now: Instant) -> Duration {
        self.refill(now);
        let deficit = cost - self.tokens;
        if deficit <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(deficit / self.refill_rate)
        }
    }
}

/// Request and token budgets for one provider.
///
/// Either budget may be absent. Acquisition blocks asynchronously until
/// both buckets can cover the request.
#[derive(Debug, Default)]
pub struct RateLimiter {
    requests: Option<Mutex<TokenBucket>>,
    tokens: Option<Mutex<TokenBucket>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: Option<u32>, tokens_per_minute: Option<u32>) -> Self {
        Self {
            requests: requests_per_minute.map(|n| Mutex::new(TokenBucket::per_minute(n))),
            tokens: tokens_per_minute.map(|n| Mutex::new(TokenBucket::per_minute(n))),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn is_limited(&self) -> bool {
        self.requests.is_some() || self.tokens.is_some()
    }

    /// Wait until one request carrying `estimated_tokens` tokens may be sent.
    ///
    /// A request larger than the whole token budget is charged the full
    /// capacity instead of waiting forever.
    pub async fn acquire(&self, estimated_tokens: usize) {
        if let Some(bucket) = &self.requests {
            take(bucket, 1.0, "requests").await;
        }
        if let Some(bucket) = &self.tokens {
            take(bucket, estimated_tokens as f64, "tokens").await;
        }
    }
}

async fn take(bucket: &Mutex<TokenBucket>, cost: f64, what: &str) {
    let mut bucket = bucket.lock().await;
    let cost = cost.min(bucket.capacity());
    loop {
        let now = Instant::now();
        if bucket.try_acquire(cost, now) {
            return;
        }
        let wait = bucket.wait_time(cost, now);
        debug!(what, wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
        tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bucket_starts_full_and_refills_over_time() {
        let mut bucket = TokenBucket::per_minute(60);
        let start = Instant::now();
        assert!(bucket.try_acquire(60.0, start));
        assert!(!bucket.try_acquire(1.0, start));
        assert_eq!(bucket.wait_time(1.0, start), Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(bucket.try_acquire(2.0, Instant::now()));
        assert!(!bucket.try_acquire(1.0, Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_never_exceeds_capacity() {
        let mut bucket = TokenBucket::per_minute(10);
        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(bucket.try_acquire(10.0, Instant::now()));
        assert!(!bucket.try_acquire(1.0, Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_blocks_until_a_request_token_frees_up() {
        let limiter = RateLimiter::new(Some(2), None);
        let start = Instant::now();
        limiter.acquire(0).await;
        limiter.acquire(0).await;
        assert_eq!(Instant::now(), start);

        // One request per 30s at 2 rpm.
        limiter.acquire(0).await;
        let waited = Instant::now() - start;
        assert!(waited >= Duration::from_secs(30));
        assert!(waited < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_requests_are_clamped_to_capacity() {
        let limiter = RateLimiter::new(None, Some(100));
        let start = Instant::now();
        limiter.acquire(5_000).await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test]
    async fn unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        assert!(!limiter.is_limited());
        limiter.acquire(1_000_000).await;
    }
}
