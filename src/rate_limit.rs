//! Query rate limiting for batch resolution.
//!
//! Batch mode can push thousands of discovery lookups at a single recursive
//! nameserver. A token bucket caps the sustained query rate while a
//! semaphore bounds how many exchanges are in flight at once.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use tracing::debug;

/// Token bucket plus concurrency bound for outbound DNS queries.
#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens added per refill period
    capacity: usize,
    /// Current token count
    tokens: Mutex<usize>,
    /// Refill period in milliseconds
    refill_time_ms: u64,
    /// Last time tokens were refilled
    last_refill: Mutex<Instant>,
    /// Bound on in-flight queries
    concurrency_limit: Arc<Semaphore>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_period` queries every
    /// `period_ms` milliseconds with at most `max_concurrent` in flight.
    pub fn new(requests_per_period: usize, period_ms: u64, max_concurrent: usize) -> Self {
        Self {
            capacity: requests_per_period,
            tokens: Mutex::new(requests_per_period),
            refill_time_ms: period_ms,
            last_refill: Mutex::new(Instant::now()),
            concurrency_limit: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Waits for a token and a concurrency permit.
    ///
    /// The returned guard holds the permit; dropping it lets the next queued
    /// query proceed.
    pub async fn acquire(&self) -> Result<RateLimitGuard> {
        loop {
            let wait_time = self.try_acquire().await;
            if wait_time == Duration::ZERO {
                break;
            }
            debug!("query rate limit reached, waiting {:?}", wait_time);
            sleep(wait_time).await;
        }

        let permit = self
            .concurrency_limit
            .clone()
            .acquire_owned()
            .await
            .context("failed to acquire concurrency permit")?;

        Ok(RateLimitGuard { _permit: permit })
    }

    /// Takes a token if one is available, otherwise returns how long to wait
    /// before the next token arrives.
    async fn try_acquire(&self) -> Duration {
        let mut tokens = self.tokens.lock().await;
        let mut last_refill = self.last_refill.lock().await;
        let now = Instant::now();

        let elapsed = now.duration_since(*last_refill).as_millis() as u64;
        if elapsed >= self.refill_time_ms {
            let periods = elapsed / self.refill_time_ms;
            let new_tokens = periods as usize * self.capacity;
            *tokens = (*tokens + new_tokens).min(self.capacity);
            *last_refill = now - Duration::from_millis(elapsed % self.refill_time_ms);
        }

        if *tokens > 0 {
            *tokens -= 1;
            Duration::ZERO
        } else {
            let since_refill = now.duration_since(*last_refill).as_millis() as u64;
            Duration::from_millis(self.refill_time_ms.saturating_sub(since_refill))
        }
    }
}

/// Releases the concurrency permit when dropped.
#[derive(Debug)]
pub struct RateLimitGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Limiter sized for batch discovery against a recursive resolver:
/// `queries_per_minute` sustained, `max_concurrent` in flight.
pub fn batch_query_limiter(queries_per_minute: usize, max_concurrent: usize) -> RateLimiter {
    RateLimiter::new(queries_per_minute, 60_000, max_concurrent)
}
