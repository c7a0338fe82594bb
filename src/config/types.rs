//! Configuration sections

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Hard ceiling on deployable capital (USDC)
    pub bankroll_ceiling: f64,
    /// Per-instrument cap as a fraction of the ceiling
    pub position_cap_pct: f64,
    /// Conservative multiplier on full Kelly (0.25 = quarter Kelly)
    pub kelly_multiplier: f64,
    /// Minimum |modeled - market| to act on
    pub min_edge_threshold: f64,
    /// Realized daily loss, as a fraction of the day-start bankroll, that halts trading
    pub daily_loss_limit_pct: f64,
    /// Refuse all new positions
    pub kill_switch: bool,
    /// Maximum |vwap - best| / best on a paper fill
    pub max_slippage_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionSection {
    pub sigma_near: f64,
    pub sigma_mid: f64,
    pub sigma_far: f64,
    pub near_term_days: i64,
    pub mid_term_days: i64,
    pub max_horizon_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanSection {
    /// Skip events whose total traded volume is below this (USDC)
    pub min_volume: f64,
    /// Keep at most this many signals per event
    pub max_buckets_per_event: usize,
    /// Skip forecasts retrieved longer ago than this
    pub max_forecast_age_hours: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSection {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub request_timeout_ms: u64,
    pub requests_per_second: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSection {
    /// Directory holding `ledger/`
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}
