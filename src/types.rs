//! Core types used throughout wxedge
//!
//! Market snapshots, forecasts, signals, trades and ledger rollups.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clob::OrderBook;
use crate::polymarket::{Confidence, Side};

/// Weather quantity an event settles on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TemperatureHigh,
    TemperatureLow,
    Precipitation,
    Snowfall,
}

impl Metric {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature_high" | "high" => Some(Metric::TemperatureHigh),
            "temperature_low" | "low" => Some(Metric::TemperatureLow),
            "precipitation" | "precip" | "rain" => Some(Metric::Precipitation),
            "snowfall" | "snow" => Some(Metric::Snowfall),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::TemperatureHigh => write!(f, "temperature_high"),
            Metric::TemperatureLow => write!(f, "temperature_low"),
            Metric::Precipitation => write!(f, "precipitation"),
            Metric::Snowfall => write!(f, "snowfall"),
        }
    }
}

/// What a bucket pays out on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BucketOutcome {
    /// Observed value in `[lower, upper)`; a missing bound is unbounded
    Range {
        #[serde(default)]
        lower: Option<f64>,
        #[serde(default)]
        upper: Option<f64>,
    },
    /// Binary yes/no outcome (e.g. "will it rain")
    Boolean { positive: bool },
}

impl BucketOutcome {
    pub fn above(threshold: f64) -> Self {
        BucketOutcome::Range {
            lower: Some(threshold),
            upper: None,
        }
    }

    pub fn below(threshold: f64) -> Self {
        BucketOutcome::Range {
            lower: None,
            upper: Some(threshold),
        }
    }

    pub fn between(lower: f64, upper: f64) -> Self {
        BucketOutcome::Range {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// Whether an observed value settles this bucket YES.
    ///
    /// For boolean buckets the observation is treated as an amount: any
    /// strictly positive amount is the positive outcome.
    pub fn contains(&self, observed: f64) -> bool {
        match *self {
            BucketOutcome::Range { lower, upper } => {
                lower.map_or(true, |l| observed >= l) && upper.map_or(true, |u| observed < u)
            }
            BucketOutcome::Boolean { positive } => (observed > 0.0) == positive,
        }
    }

    /// Lower bound as a real number (-inf when open)
    pub fn lower_bound(&self) -> f64 {
        match *self {
            BucketOutcome::Range { lower, .. } => lower.unwrap_or(f64::NEG_INFINITY),
            BucketOutcome::Boolean { .. } => f64::NEG_INFINITY,
        }
    }

    /// Upper bound as a real number (+inf when open)
    pub fn upper_bound(&self) -> f64 {
        match *self {
            BucketOutcome::Range { upper, .. } => upper.unwrap_or(f64::INFINITY),
            BucketOutcome::Boolean { .. } => f64::INFINITY,
        }
    }
}

/// One exclusive outcome of an event, snapshotted at scan time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeBucket {
    /// Venue instrument id (YES token / market id)
    pub instrument_id: String,
    /// Human-readable label, e.g. "60-61°F"
    pub label: String,
    pub outcome: BucketOutcome,
    #[serde(default)]
    pub yes_bid: Option<f64>,
    #[serde(default)]
    pub yes_ask: Option<f64>,
    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub book: OrderBook,
}

impl OutcomeBucket {
    /// YES price a taker would pay right now: quoted ask, then book ask, then last trade.
    pub fn executable_price(&self) -> Option<f64> {
        self.yes_ask
            .or_else(|| self.book.best_ask().map(|level| level.price))
            .or(self.last_price)
            .filter(|p| p.is_finite() && *p >= 0.0 && *p <= 1.0)
    }
}

/// A set of mutually exclusive buckets settling on one observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub event_id: String,
    /// Venue-native reference used to fetch settlement data
    #[serde(default)]
    pub venue_event_ref: Option<String>,
    #[serde(default)]
    pub question: String,
    pub location: String,
    pub event_date: NaiveDate,
    pub metric: Metric,
    pub buckets: Vec<OutcomeBucket>,
}

impl MarketEvent {
    pub fn total_volume(&self) -> f64 {
        self.buckets.iter().map(|b| b.volume).sum()
    }

    /// Days between `today` and the event date (negative once the event is past)
    pub fn horizon_days(&self, today: NaiveDate) -> i64 {
        (self.event_date - today).num_days()
    }
}

/// Raw forecast for a location and date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub location: String,
    pub forecast_date: NaiveDate,
    pub retrieved_at: DateTime<Utc>,
    #[serde(default)]
    pub temperature_high: Option<f64>,
    #[serde(default)]
    pub temperature_low: Option<f64>,
    /// Probability of precipitation, 0-1
    #[serde(default)]
    pub precip_probability: Option<f64>,
    #[serde(default)]
    pub narrative: String,
}

impl Forecast {
    /// Point estimate (or direct probability) relevant to a metric
    pub fn value_for(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::TemperatureHigh => self.temperature_high,
            Metric::TemperatureLow => self.temperature_low,
            Metric::Precipitation => self.precip_probability,
            Metric::Snowfall => None,
        }
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.retrieved_at).num_seconds() as f64 / 3600.0
    }
}

/// Edge on one bucket, sized before risk limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub event_id: String,
    pub instrument_id: String,
    pub bucket_label: String,
    /// Modeled YES probability
    pub modeled_probability: f64,
    /// Executable YES price
    pub market_price: f64,
    /// modeled - market, YES framing
    pub edge: f64,
    pub side: Side,
    /// Unconstrained Kelly fraction for the side taken
    pub kelly_fraction: f64,
    /// Kelly fraction after the conservative multiplier
    pub applied_fraction: f64,
    /// applied fraction x bankroll, before risk limits
    pub recommended_notional: f64,
    pub horizon_days: i64,
    pub confidence: Confidence,
}

impl Signal {
    /// Probability of the side taken winning
    pub fn side_probability(&self) -> f64 {
        self.side.frame(self.modeled_probability)
    }

    /// Price paid per share for the side taken
    pub fn side_price(&self) -> f64 {
        self.side.frame(self.market_price)
    }
}

/// Trade lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Filled,
    ResolvedWin,
    ResolvedLoss,
    Void,
    Cancelled,
}

impl TradeStatus {
    /// Still committing capital
    pub fn is_open(&self) -> bool {
        matches!(self, TradeStatus::Pending | TradeStatus::Filled)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            TradeStatus::ResolvedWin | TradeStatus::ResolvedLoss | TradeStatus::Void
        )
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TradeStatus::Pending),
            "filled" => Some(TradeStatus::Filled),
            "resolved_win" => Some(TradeStatus::ResolvedWin),
            "resolved_loss" => Some(TradeStatus::ResolvedLoss),
            "void" => Some(TradeStatus::Void),
            "cancelled" => Some(TradeStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "pending"),
            TradeStatus::Filled => write!(f, "filled"),
            TradeStatus::ResolvedWin => write!(f, "resolved_win"),
            TradeStatus::ResolvedLoss => write!(f, "resolved_loss"),
            TradeStatus::Void => write!(f, "void"),
            TradeStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Venue,
    Observation,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionSource::Venue => write!(f, "venue"),
            ResolutionSource::Observation => write!(f, "observation"),
        }
    }
}

/// Everything needed to resolve a trade without the original market snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeContext {
    pub venue_event_ref: Option<String>,
    pub location: String,
    pub metric: Metric,
    pub outcome: BucketOutcome,
    pub event_date: NaiveDate,
}

impl TradeContext {
    /// Instruments settling on the same observation share one exposure cap.
    pub fn correlation_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.location.trim().to_ascii_lowercase(),
            self.metric,
            self.event_date
        )
    }
}

/// Fill details set once by the paper executor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Fill {
    /// Volume-weighted price paid for the side taken
    pub price: f64,
    pub shares: f64,
    pub notional: f64,
    /// Book levels consumed by the walk
    pub levels_consumed: usize,
    /// Best price on the ladder when the walk started
    pub best_price: f64,
    pub filled_at: DateTime<Utc>,
}

/// Resolution details set exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub status: TradeStatus,
    /// Per-share payout for the side held (1, 0, or the entry price when void)
    pub payout: f64,
    pub realized_pnl: f64,
    pub source: ResolutionSource,
    pub observed_value: Option<f64>,
    pub resolved_at: DateTime<Utc>,
}

/// Append-only trade record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub instrument_id: String,
    pub event_id: String,
    pub bucket_label: String,
    pub side: Side,
    /// Side price at decision time
    pub decision_price: f64,
    /// Admitted notional (USDC)
    pub notional: f64,
    /// Side probability at decision time
    pub modeled_probability: f64,
    /// Signed YES-framed edge at decision time
    pub edge: f64,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub context: TradeContext,
    pub fill: Option<Fill>,
    pub resolution: Option<Resolution>,
}

impl Trade {
    /// Build a pending intent from a signal and its admitted notional
    pub fn intent(
        signal: &Signal,
        notional: f64,
        context: TradeContext,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            instrument_id: signal.instrument_id.clone(),
            event_id: signal.event_id.clone(),
            bucket_label: signal.bucket_label.clone(),
            side: signal.side,
            decision_price: signal.side_price(),
            notional,
            modeled_probability: signal.side_probability(),
            edge: signal.edge,
            status: TradeStatus::Pending,
            created_at,
            context,
            fill: None,
            resolution: None,
        }
    }

    /// Price the position was actually entered at
    pub fn entry_price(&self) -> f64 {
        self.fill.map(|f| f.price).unwrap_or(self.decision_price)
    }

    /// Notional at risk (filled notional once filled)
    pub fn committed_notional(&self) -> f64 {
        self.fill.map(|f| f.notional).unwrap_or(self.notional)
    }

    pub fn realized_pnl(&self) -> f64 {
        self.resolution.as_ref().map(|r| r.realized_pnl).unwrap_or(0.0)
    }
}

/// Derived open exposure for one instrument
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument_id: String,
    pub notional: f64,
    pub fills: usize,
    pub pending: usize,
}

/// End-of-day rollup, write-once per date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub snapshot_date: NaiveDate,
    pub cash: f64,
    pub at_risk: f64,
    pub realized_pnl: f64,
    pub trade_count: u32,
    pub open_positions: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(location: &str, outcome: BucketOutcome) -> TradeContext {
        TradeContext {
            venue_event_ref: None,
            location: location.to_string(),
            metric: Metric::Precipitation,
            outcome,
            event_date: NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(),
        }
    }

    #[test]
    fn range_contains_is_half_open() {
        let b = BucketOutcome::between(60.0, 62.0);
        assert!(b.contains(60.0));
        assert!(b.contains(61.9));
        assert!(!b.contains(62.0));
        assert!(BucketOutcome::above(80.0).contains(1000.0));
        assert!(BucketOutcome::below(30.0).contains(-40.0));
    }

    #[test]
    fn boolean_bucket_settles_on_positive_amount() {
        let rain = BucketOutcome::Boolean { positive: true };
        let dry = BucketOutcome::Boolean { positive: false };
        assert!(rain.contains(0.12));
        assert!(!rain.contains(0.0));
        assert!(dry.contains(0.0));
    }

    #[test]
    fn executable_price_prefers_quoted_ask() {
        let mut bucket = OutcomeBucket {
            instrument_id: "tok".into(),
            label: "x".into(),
            outcome: BucketOutcome::above(70.0),
            yes_bid: None,
            yes_ask: None,
            last_price: Some(0.4),
            volume: 0.0,
            book: OrderBook::default(),
        };
        assert_eq!(bucket.executable_price(), Some(0.4));
        bucket.yes_ask = Some(0.45);
        assert_eq!(bucket.executable_price(), Some(0.45));
    }

    #[test]
    fn correlation_key_ignores_bucket_and_case() {
        let yes = context("Chicago", BucketOutcome::Boolean { positive: true });
        let no = context("chicago ", BucketOutcome::Boolean { positive: false });
        assert_eq!(yes.correlation_key(), no.correlation_key());
        assert_eq!(yes.correlation_key(), "chicago|precipitation|2026-07-04");
    }

    #[test]
    fn intents_get_full_uuid_ids() {
        let signal = Signal {
            event_id: "evt".into(),
            instrument_id: "tok".into(),
            bucket_label: "rain".into(),
            modeled_probability: 0.9,
            market_price: 0.5,
            edge: 0.4,
            side: Side::Yes,
            kelly_fraction: 0.8,
            applied_fraction: 0.2,
            recommended_notional: 100.0,
            horizon_days: 1,
            confidence: Confidence::High,
        };
        let outcome = BucketOutcome::Boolean { positive: true };
        let a = Trade::intent(&signal, 50.0, context("Chicago", outcome), Utc::now());
        let b = Trade::intent(&signal, 50.0, context("Chicago", outcome), Utc::now());
        assert_eq!(a.id.len(), 32);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, TradeStatus::Pending);
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [
            TradeStatus::Pending,
            TradeStatus::Filled,
            TradeStatus::ResolvedWin,
            TradeStatus::ResolvedLoss,
            TradeStatus::Void,
            TradeStatus::Cancelled,
        ] {
            assert_eq!(TradeStatus::from_str(&s.to_string()), Some(s));
        }
    }
}
