//! Token-bucket pacing for outbound requests.
//!
//! Hyperliquid's documented address-level budget is 20 requests per second;
//! the bucket defaults to that capacity and refill rate. Refill is derived
//! from elapsed time at each call, so there is no background task to manage
//! or shut down.

use std::time::Duration;

use tokio::{
    sync::Mutex,
    time::{Instant, sleep},
};

use crate::error::{Error, Result};

/// Requests per second the exchange allows per address.
pub const DEFAULT_RATE: u32 = 20;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket. One token buys one outbound HTTP request.
///
/// [`acquire`](RateLimiter::acquire) waits for a token; the wait *is* the
/// retry, so callers never observe a rate-limit error on this path.
/// [`try_acquire`](RateLimiter::try_acquire) fails fast instead, for
/// callers that would rather drop work than queue it.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE, DEFAULT_RATE)
    }
}

impl RateLimiter {
    /// Creates a bucket with the given capacity and refill rate. The bucket
    /// starts full.
    #[must_use]
    pub fn new(capacity: u32, refill_per_sec: u32) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_per_sec: f64::from(refill_per_sec),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
    }

    /// Takes one token, waiting for the bucket to refill if necessary.
    ///
    /// The sleep happens outside the lock, so waiting callers do not block
    /// each other's refill accounting.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec)
            };
            sleep(wait).await;
        }
    }

    /// Takes one token if immediately available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimited`] when the bucket is empty. This is the
    /// only place that error is produced.
    pub fn try_acquire(&self) -> Result<()> {
        let mut bucket = self
            .bucket
            .try_lock()
            .map_err(|_| Error::RateLimited)?;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(Error::RateLimited)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_capacity_without_waiting() {
        let limiter = RateLimiter::new(20, 20);
        let start = Instant::now();
        for _ in 0..20 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start, "full bucket must not sleep");
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_refill_when_empty() {
        let limiter = RateLimiter::new(2, 2);
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        let waited = Instant::now().duration_since(start);
        assert!(
            waited >= Duration::from_millis(450),
            "expected ~500ms wait, got {waited:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_fails_fast_when_empty() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.try_acquire().is_ok());
        assert!(matches!(limiter.try_acquire(), Err(Error::RateLimited)));

        // One full refill interval later a token is back.
        sleep(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new(3, 3);
        sleep(Duration::from_secs(60)).await;
        for _ in 0..3 {
            assert!(limiter.try_acquire().is_ok());
        }
        assert!(limiter.try_acquire().is_err());
    }
}
