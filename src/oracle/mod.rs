//! Oracle module - external data seams
//!
//! Market snapshots, forecasts, venue settlements and observed weather all
//! arrive through the async traits below. Every call made by the engine goes
//! through [`retry::with_retry`], throttled per provider by
//! [`rate_limit::ProviderRateLimiter`], so a flaky provider costs bounded time
//! and surfaces as a typed `ProviderFailed`.

pub mod rate_limit;
pub mod retry;
pub mod sources;

pub use rate_limit::ProviderRateLimiter;
pub use retry::{with_retry, RetryPolicy};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use crate::types::{Forecast, MarketEvent, Metric};

/// Lists open weather events with their buckets and books
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn events(&self) -> Result<Vec<MarketEvent>>;
}

/// Point forecast for a location and date
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn forecast(&self, location: &str, date: NaiveDate) -> Result<Option<Forecast>>;
}

/// Final YES price per instrument, or `None` while the event is unsettled
#[async_trait]
pub trait SettlementSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn settlement(&self, event_ref: &str) -> Result<Option<HashMap<String, f64>>>;
}

/// Observed value for a location, date and metric
#[async_trait]
pub trait ObservationSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn observed(&self, location: &str, date: NaiveDate, metric: Metric)
        -> Result<Option<f64>>;
}
