//! Bounded retries with exponential backoff and per-attempt timeouts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::rate_limit::ProviderRateLimiter;
use crate::error::{EngineError, Result};

const BACKOFF_JITTER_RATIO: f64 = 0.20;
const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            request_timeout_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), with ±20% jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let capped_attempt = attempt.saturating_sub(1).min(16);
        let base = self
            .base_backoff_ms
            .saturating_mul(1u64 << capped_attempt)
            .min(MAX_BACKOFF_MS);
        let unit: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        let jitter = 1.0 + unit * BACKOFF_JITTER_RATIO;
        Duration::from_millis(((base as f64) * jitter).round().max(0.0) as u64)
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` is exhausted.
/// Each attempt first waits on `limiter`, when one is given.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    limiter: Option<&ProviderRateLimiter>,
    provider: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let timeout = Duration::from_millis(policy.request_timeout_ms.max(1));
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if let Some(limiter) = limiter {
            limiter.acquire(provider).await;
        }
        match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => last_error = format!("{err:#}"),
            Err(_) => last_error = format!("timed out after {}ms", timeout.as_millis()),
        }

        if attempt < attempts {
            let delay = policy.backoff(attempt);
            warn!(
                provider,
                attempt,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Provider call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(EngineError::ProviderFailed {
        provider: provider.to_string(),
        attempts,
        detail: last_error,
    })
}
