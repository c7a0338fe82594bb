//! Per-provider request throttling.
//!
//! One token bucket per provider name; every attempt made by
//! [`with_retry`](super::with_retry) waits for a token first.

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

pub struct ProviderRateLimiter {
    limiter: DefaultKeyedRateLimiter<&'static str>,
    per_second: u32,
    burst: u32,
}

impl std::fmt::Debug for ProviderRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRateLimiter")
            .field("per_second", &self.per_second)
            .field("burst", &self.burst)
            .finish()
    }
}

impl ProviderRateLimiter {
    /// `None` when `per_second` is zero (throttling disabled).
    pub fn new(per_second: u32, burst: u32) -> Option<Self> {
        let rate = NonZeroU32::new(per_second)?;
        let burst_size = NonZeroU32::new(burst).unwrap_or(rate);
        Some(Self {
            limiter: RateLimiter::keyed(Quota::per_second(rate).allow_burst(burst_size)),
            per_second,
            burst: burst_size.get(),
        })
    }

    /// Wait until `provider` may make another request.
    pub async fn acquire(&self, provider: &'static str) {
        self.limiter.until_key_ready(&provider).await;
    }

    /// Take a token without waiting; false when the bucket is empty.
    pub fn try_acquire(&self, provider: &'static str) -> bool {
        self.limiter.check_key(&provider).is_ok()
    }
}
