//! Bounded retry with exponential backoff for model calls.
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can record the delays
//! instead of waiting on the wall clock.

use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::ModelError;

/// Something that can wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}

/// Run `operation` up to `config.max_attempts` times in total.
///
/// Only transient errors (timeouts, rate limits) are retried; anything else is
/// returned immediately. The last error is returned once attempts run out.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, ModelError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !e.is_transient() || attempt >= max_attempts {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt - 1, &e);
                tracing::warn!(
                    attempt,
                    max = max_attempts,
                    backoff_ms,
                    error = %e,
                    "Retrying model call after transient error"
                );
                sleeper.sleep(Duration::from_millis(backoff_ms)).await;
            }
        }
    }
}

/// Backoff before the retry following the failed attempt with 0-based index
/// `retry`, honouring a server-provided `Retry-After`.
///
/// `Retry-After` is capped at `max_backoff_ms` like any computed delay.
pub fn compute_backoff(config: &RetryConfig, retry: u32, err: &ModelError) -> u64 {
    let computed = compute_exponential_backoff(config, retry);
    match err {
        ModelError::RateLimited {
            retry_after_secs: Some(secs),
        } => secs
            .saturating_mul(1000)
            .min(config.max_backoff_ms)
            .max(computed),
        _ => computed,
    }
}

/// Exponential backoff capped at `max_backoff_ms`, plus up to 25% jitter.
pub fn compute_exponential_backoff(config: &RetryConfig, retry: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(retry as i32);
    let capped = base.min(config.max_backoff_ms as f64).max(0.0) as u64;
    if config.jitter {
        let jitter = (capped as f64 * 0.25 * rand::thread_rng().r#gen::<f64>()) as u64;
        capped + jitter
    } else {
        capped
    }
}
