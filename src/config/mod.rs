//! Configuration management for wxedge
//!
//! Loads built-in defaults, optional `config/default` and `config/local` files,
//! then environment overrides (`WXEDGE__SECTION__KEY`) after reading `.env`.

mod types;

pub use types::*;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::distribution::DistributionConfig;
use crate::error::EngineError;
use crate::oracle::RetryPolicy;
use crate::paper_trading::PaperExecutorConfig;
use crate::risk::RiskConfig;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub distribution: DistributionSection,
    pub scan: ScanSection,
    pub execution: ExecutionSection,
    pub persistence: PersistenceSection,
    pub logging: LoggingSection,
}

/// Scan filters applied before modeling
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub min_volume: f64,
    pub max_buckets_per_event: usize,
    pub max_forecast_age_hours: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_volume: 0.0,
            max_buckets_per_event: 2,
            max_forecast_age_hours: 12.0,
        }
    }
}

/// Per-provider token bucket; a zero rate disables throttling
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst: 20,
        }
    }
}

/// Everything the engine needs, threaded explicitly into each component
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub risk: RiskConfig,
    pub kelly_multiplier: f64,
    pub min_edge_threshold: f64,
    pub executor: PaperExecutorConfig,
    pub distribution: DistributionConfig,
    pub scan: ScanConfig,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk: RiskConfig::default(),
            kelly_multiplier: 0.25,
            min_edge_threshold: 0.10,
            executor: PaperExecutorConfig::default(),
            distribution: DistributionConfig::default(),
            scan: ScanConfig::default(),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn check(ok: bool, message: impl FnOnce() -> String) -> crate::error::Result<()> {
    if ok {
        Ok(())
    } else {
        Err(EngineError::ConfigurationInvalid(message()))
    }
}

impl EngineConfig {
    /// Enforce documented ranges.
    pub fn validate(&self) -> crate::error::Result<()> {
        let r = &self.risk;
        check(r.bankroll_ceiling.is_finite() && r.bankroll_ceiling > 0.0, || {
            format!("bankroll_ceiling must be > 0, got {}", r.bankroll_ceiling)
        })?;
        check(r.position_cap_pct > 0.0 && r.position_cap_pct <= 0.5, || {
            format!("position_cap_pct must be in (0, 0.5], got {}", r.position_cap_pct)
        })?;
        check(self.kelly_multiplier > 0.0 && self.kelly_multiplier <= 1.0, || {
            format!("kelly_multiplier must be in (0, 1], got {}", self.kelly_multiplier)
        })?;
        check(self.min_edge_threshold > 0.0 && self.min_edge_threshold <= 0.5, || {
            format!("min_edge_threshold must be in (0, 0.5], got {}", self.min_edge_threshold)
        })?;
        check(r.daily_loss_limit_pct > 0.0 && r.daily_loss_limit_pct <= 1.0, || {
            format!("daily_loss_limit_pct must be in (0, 1], got {}", r.daily_loss_limit_pct)
        })?;
        let slip = self.executor.max_slippage_pct;
        check(slip > 0.0 && slip < 1.0, || {
            format!("max_slippage_pct must be in (0, 1), got {slip}")
        })?;

        let d = &self.distribution;
        check(
            [d.sigma_near, d.sigma_mid, d.sigma_far]
                .iter()
                .all(|s| s.is_finite() && *s > 0.0),
            || "sigma values must be positive".to_string(),
        )?;
        check(
            d.near_term_days >= 0 && d.mid_term_days >= d.near_term_days,
            || {
                format!(
                    "horizon breakpoints must satisfy 0 <= near ({}) <= mid ({})",
                    d.near_term_days, d.mid_term_days
                )
            },
        )?;
        check(d.max_horizon_days >= 0, || {
            format!("max_horizon_days must be >= 0, got {}", d.max_horizon_days)
        })?;

        let s = &self.scan;
        check(s.min_volume >= 0.0, || {
            format!("min_volume must be >= 0, got {}", s.min_volume)
        })?;
        check(s.max_buckets_per_event >= 1, || {
            "max_buckets_per_event must be >= 1".to_string()
        })?;
        check(s.max_forecast_age_hours > 0.0, || {
            format!("max_forecast_age_hours must be > 0, got {}", s.max_forecast_age_hours)
        })?;
        check(self.retry.max_attempts >= 1, || {
            "max_attempts must be >= 1".to_string()
        })?;
        check(self.retry.request_timeout_ms > 0, || {
            "request_timeout_ms must be > 0".to_string()
        })?;
        let rl = &self.rate_limit;
        check(rl.requests_per_second == 0 || rl.burst >= rl.requests_per_second, || {
            format!(
                "burst ({}) must be >= requests_per_second ({})",
                rl.burst, rl.requests_per_second
            )
        })
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (WXEDGE__ENGINE__KILL_SWITCH=true)
            .add_source(Environment::with_prefix("WXEDGE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Built-in defaults only
    pub fn defaults() -> Result<Self> {
        Self::builder()?
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            // Engine defaults
            .set_default("engine.bankroll_ceiling", 500.0)?
            .set_default("engine.position_cap_pct", 0.05)?
            .set_default("engine.kelly_multiplier", 0.25)?
            .set_default("engine.min_edge_threshold", 0.10)?
            .set_default("engine.daily_loss_limit_pct", 0.05)?
            .set_default("engine.kill_switch", false)?
            .set_default("engine.max_slippage_pct", 0.05)?
            // Forecast error schedule (°F)
            .set_default("distribution.sigma_near", 3.0)?
            .set_default("distribution.sigma_mid", 4.0)?
            .set_default("distribution.sigma_far", 5.0)?
            .set_default("distribution.near_term_days", 1)?
            .set_default("distribution.mid_term_days", 2)?
            .set_default("distribution.max_horizon_days", 7)?
            // Scan filters
            .set_default("scan.min_volume", 0.0)?
            .set_default("scan.max_buckets_per_event", 2)?
            .set_default("scan.max_forecast_age_hours", 12.0)?
            // Provider calls
            .set_default("execution.max_attempts", 3)?
            .set_default("execution.base_backoff_ms", 500)?
            .set_default("execution.request_timeout_ms", 10_000)?
            .set_default("execution.requests_per_second", 10)?
            .set_default("execution.burst", 20)?
            .set_default("persistence.data_dir", "./data")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?)
    }

    /// Engine view of the configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            risk: RiskConfig {
                bankroll_ceiling: self.engine.bankroll_ceiling,
                position_cap_pct: self.engine.position_cap_pct,
                daily_loss_limit_pct: self.engine.daily_loss_limit_pct,
                kill_switch: self.engine.kill_switch,
            },
            kelly_multiplier: self.engine.kelly_multiplier,
            min_edge_threshold: self.engine.min_edge_threshold,
            executor: PaperExecutorConfig {
                max_slippage_pct: self.engine.max_slippage_pct,
            },
            distribution: DistributionConfig {
                sigma_near: self.distribution.sigma_near,
                sigma_mid: self.distribution.sigma_mid,
                sigma_far: self.distribution.sigma_far,
                near_term_days: self.distribution.near_term_days,
                mid_term_days: self.distribution.mid_term_days,
                max_horizon_days: self.distribution.max_horizon_days,
            },
            scan: ScanConfig {
                min_volume: self.scan.min_volume,
                max_buckets_per_event: self.scan.max_buckets_per_event,
                max_forecast_age_hours: self.scan.max_forecast_age_hours,
            },
            retry: RetryPolicy {
                max_attempts: self.execution.max_attempts,
                base_backoff_ms: self.execution.base_backoff_ms,
                request_timeout_ms: self.execution.request_timeout_ms,
            },
            rate_limit: RateLimitConfig {
                requests_per_second: self.execution.requests_per_second,
                burst: self.execution.burst,
            },
        }
    }

    /// Validate ranges; the error is `ConfigurationInvalid`
    pub fn validate(&self) -> crate::error::Result<EngineConfig> {
        let engine = self.engine_config();
        engine.validate()?;
        Ok(engine)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "bankroll={:.2} cap={:.2} kelly={:.2} min_edge={:.2} daily_loss={:.2} slippage={:.2} kill_switch={}",
            self.engine.bankroll_ceiling,
            self.engine.position_cap_pct,
            self.engine.kelly_multiplier,
            self.engine.min_edge_threshold,
            self.engine.daily_loss_limit_pct,
            self.engine.max_slippage_pct,
            self.engine.kill_switch
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
