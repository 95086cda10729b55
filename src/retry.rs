//! Datagram retransmission with exponential backoff.
//!
//! UDP gives no delivery guarantee, so every query is driven through a small
//! retransmit schedule: a fixed number of attempts with exponentially
//! increasing waits between them and optional jitter to keep a fleet of
//! resolvers from retransmitting in lockstep. This mirrors the behavior a
//! stub resolver inherits from its platform library.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Retransmit schedule for one DNS exchange.
///
/// # Examples
///
/// ```
/// use epcdns::retry::RetransmitConfig;
///
/// // Platform-resolver-like defaults
/// let config = RetransmitConfig::default();
/// assert_eq!(config.attempts, 2);
///
/// let aggressive = RetransmitConfig {
///     attempts: 5,
///     initial_backoff_ms: 50,
///     backoff_factor: 2.0,
///     max_backoff_ms: 2000,
///     add_jitter: true,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RetransmitConfig {
    /// Total number of send attempts (the first try included)
    pub attempts: u32,

    /// Wait after the first failed attempt, in milliseconds
    pub initial_backoff_ms: u64,

    /// Multiplier applied to the wait after each further attempt
    pub backoff_factor: f64,

    /// Upper bound on the wait between attempts, in milliseconds
    pub max_backoff_ms: u64,

    /// Whether to randomize each wait by roughly +/-10%
    pub add_jitter: bool,
}

impl Default for RetransmitConfig {
    fn default() -> Self {
        Self {
            attempts: 2,
            initial_backoff_ms: 500,
            backoff_factor: 2.0,
            max_backoff_ms: 5000,
            add_jitter: true,
        }
    }
}

/// Runs `operation` until it succeeds or the schedule is exhausted.
///
/// The operation receives the attempt number (starting at 1) so it can log
/// retransmissions. Every error is treated as retriable; a datagram exchange
/// cannot tell a lost packet from a slow server, so the only non-retriable
/// outcome is running out of attempts, in which case the last error is
/// returned.
pub async fn with_retransmit<F, Fut, T>(operation: F, config: &RetransmitConfig) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff_ms = config.initial_backoff_ms;
    let attempts = config.attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt == attempts {
                    last_err = Some(err);
                    break;
                }

                let wait_ms = if config.add_jitter {
                    let jitter_factor = rand::random::<f64>() * 0.2 + 0.9;
                    (backoff_ms as f64 * jitter_factor) as u64
                } else {
                    backoff_ms
                };
                let wait_ms = wait_ms.min(config.max_backoff_ms);

                debug!(
                    "attempt {}/{} failed ({}), retransmitting after {}ms",
                    attempt, attempts, err, wait_ms
                );
                sleep(Duration::from_millis(wait_ms)).await;

                backoff_ms = ((backoff_ms as f64 * config.backoff_factor) as u64)
                    .min(config.max_backoff_ms);
            }
        }
    }

    Err(last_err.expect("loop ran at least one attempt"))
}
