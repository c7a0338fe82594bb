//! File-backed providers for offline cycles and tests.
//!
//! A market snapshot carries events (with books) and forecasts; an outcome
//! snapshot carries venue settlements and observed values. One `StaticSource`
//! serves all four provider traits.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::oracle::{ForecastProvider, MarketDataProvider, ObservationSource, SettlementSource};
use crate::types::{Forecast, MarketEvent, Metric};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub events: Vec<MarketEvent>,
    #[serde(default)]
    pub forecasts: Vec<Forecast>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub location: String,
    pub date: NaiveDate,
    pub metric: Metric,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeSnapshot {
    /// Venue event ref -> instrument id -> final YES price
    #[serde(default)]
    pub settlements: HashMap<String, HashMap<String, f64>>,
    #[serde(default)]
    pub observations: Vec<ObservationRecord>,
}

#[derive(Debug, Default)]
pub struct StaticSource {
    market: MarketSnapshot,
    outcomes: OutcomeSnapshot,
    /// Forecast calls left to fail before answering
    forecast_failures: AtomicU32,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

impl StaticSource {
    pub fn new(market: MarketSnapshot, outcomes: OutcomeSnapshot) -> Self {
        Self {
            market,
            outcomes,
            forecast_failures: AtomicU32::new(0),
        }
    }

    pub fn from_market_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(read_json(path.as_ref())?, OutcomeSnapshot::default()))
    }

    pub fn from_outcome_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(MarketSnapshot::default(), read_json(path.as_ref())?))
    }

    pub fn with_event(mut self, event: MarketEvent) -> Self {
        self.market.events.push(event);
        self
    }

    pub fn with_forecast(mut self, forecast: Forecast) -> Self {
        self.market.forecasts.push(forecast);
        self
    }

    pub fn with_settlement(mut self, event_ref: &str, prices: &[(&str, f64)]) -> Self {
        self.outcomes.settlements.insert(
            event_ref.to_string(),
            prices.iter().map(|(id, p)| (id.to_string(), *p)).collect(),
        );
        self
    }

    pub fn with_observation(mut self, location: &str, date: NaiveDate, metric: Metric, value: f64) -> Self {
        self.outcomes.observations.push(ObservationRecord {
            location: location.to_string(),
            date,
            metric,
            value,
        });
        self
    }

    /// Fail the next `n` forecast calls
    pub fn with_forecast_failures(self, n: u32) -> Self {
        self.forecast_failures.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl MarketDataProvider for StaticSource {
    fn name(&self) -> &'static str {
        "snapshot-markets"
    }

    async fn events(&self) -> Result<Vec<MarketEvent>> {
        Ok(self.market.events.clone())
    }
}

#[async_trait]
impl ForecastProvider for StaticSource {
    fn name(&self) -> &'static str {
        "snapshot-forecasts"
    }

    async fn forecast(&self, location: &str, date: NaiveDate) -> Result<Option<Forecast>> {
        let remaining = self.forecast_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.forecast_failures.store(remaining - 1, Ordering::SeqCst);
            bail!("forecast feed unavailable for {location}");
        }
        Ok(self
            .market
            .forecasts
            .iter()
            .find(|f| f.location.eq_ignore_ascii_case(location) && f.forecast_date == date)
            .cloned())
    }
}

#[async_trait]
impl SettlementSource for StaticSource {
    fn name(&self) -> &'static str {
        "snapshot-settlements"
    }

    async fn settlement(&self, event_ref: &str) -> Result<Option<HashMap<String, f64>>> {
        Ok(self.outcomes.settlements.get(event_ref).cloned())
    }
}

#[async_trait]
impl ObservationSource for StaticSource {
    fn name(&self) -> &'static str {
        "snapshot-observations"
    }

    async fn observed(&self, location: &str, date: NaiveDate, metric: Metric) -> Result<Option<f64>> {
        Ok(self
            .outcomes
            .observations
            .iter()
            .find(|o| o.location.eq_ignore_ascii_case(location) && o.date == date && o.metric == metric)
            .map(|o| o.value))
    }
}
