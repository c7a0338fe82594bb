//! Risk Limiter - capital safety checks ahead of execution
//!
//! Implements, in order:
//! - Kill switch
//! - Daily loss breaker against the day-start bankroll
//! - Per-instrument and correlated-group cap with double-down room
//! - Bankroll ceiling on total committed notional
//!
//! The limiter holds no state of its own. `RiskState` is rebuilt from a ledger
//! snapshot at the start of every cycle and admissions are folded into it as
//! the cycle proceeds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{EngineError, HaltReason};
use crate::types::{Position, Trade, TradeStatus};

/// Risk configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Hard ceiling on deployable capital (USDC)
    pub bankroll_ceiling: f64,
    /// Per-instrument cap as a fraction of the ceiling (e.g., 0.25 = 25%)
    pub position_cap_pct: f64,
    /// Daily realized loss that trips the breaker, as a fraction of the day-start bankroll
    pub daily_loss_limit_pct: f64,
    /// Refuse every admission when set
    pub kill_switch: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            bankroll_ceiling: 500.0,
            position_cap_pct: 0.05,
            daily_loss_limit_pct: 0.05,
            kill_switch: false,
        }
    }
}

impl RiskConfig {
    /// Largest open notional allowed on one instrument
    pub fn position_cap(&self) -> f64 {
        self.position_cap_pct * self.bankroll_ceiling
    }
}

/// Cycle-local view of capital, derived from the ledger
#[derive(Debug, Clone, Default)]
pub struct RiskState {
    pub today: Option<NaiveDate>,
    /// Ceiling plus all realized P&L to date
    pub bankroll: f64,
    /// Bankroll before today's resolutions
    pub day_start_bankroll: f64,
    pub realized_today: f64,
    /// Open notional across pending and filled trades
    pub committed: f64,
    exposure: HashMap<String, Position>,
    /// Open notional per correlation key (location, metric, event date)
    groups: HashMap<String, f64>,
}

impl RiskState {
    /// Derive the risk view from every trade in the ledger.
    pub fn from_trades(trades: &[Trade], config: &RiskConfig, today: NaiveDate) -> Self {
        let mut state = Self {
            today: Some(today),
            bankroll: config.bankroll_ceiling,
            day_start_bankroll: config.bankroll_ceiling,
            ..Default::default()
        };

        for trade in trades {
            if let Some(resolution) = &trade.resolution {
                state.bankroll += resolution.realized_pnl;
                if resolution.resolved_at.date_naive() == today {
                    state.realized_today += resolution.realized_pnl;
                } else {
                    state.day_start_bankroll += resolution.realized_pnl;
                }
            }
            if trade.status.is_open() {
                let notional = trade.committed_notional();
                let position = state.position_mut(&trade.instrument_id);
                position.notional += notional;
                match trade.status {
                    TradeStatus::Filled => position.fills += 1,
                    _ => position.pending += 1,
                }
                *state
                    .groups
                    .entry(trade.context.correlation_key())
                    .or_insert(0.0) += notional;
                state.committed += notional;
            }
        }

        state
    }

    fn position_mut(&mut self, instrument_id: &str) -> &mut Position {
        self.exposure
            .entry(instrument_id.to_string())
            .or_insert_with(|| Position {
                instrument_id: instrument_id.to_string(),
                ..Default::default()
            })
    }

    /// Capital available to size against, never above the ceiling
    pub fn current_bankroll(&self, config: &RiskConfig) -> f64 {
        self.bankroll.min(config.bankroll_ceiling).max(0.0)
    }

    /// Open notional on one instrument
    pub fn exposure(&self, instrument_id: &str) -> f64 {
        self.exposure
            .get(instrument_id)
            .map(|p| p.notional)
            .unwrap_or(0.0)
    }

    /// Open notional across every instrument sharing `group`
    pub fn group_exposure(&self, group: &str) -> f64 {
        self.groups.get(group).copied().unwrap_or(0.0)
    }

    /// Instruments with open exposure, sorted by id
    pub fn positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.exposure.values().cloned().collect();
        positions.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
        positions
    }

    /// Fold an admitted (and durably logged) intent into the view.
    pub fn record_admission(&mut self, instrument_id: &str, group: &str, notional: f64) {
        let position = self.position_mut(instrument_id);
        position.notional += notional;
        position.pending += 1;
        *self.groups.entry(group.to_string()).or_insert(0.0) += notional;
        self.committed += notional;
    }

    /// Pending intent turned into a fill, possibly at a different notional.
    pub fn record_fill(&mut self, instrument_id: &str, group: &str, intended: f64, filled: f64) {
        if let Some(position) = self.exposure.get_mut(instrument_id) {
            position.notional += filled - intended;
            position.pending = position.pending.saturating_sub(1);
            position.fills += 1;
        }
        if let Some(open) = self.groups.get_mut(group) {
            *open += filled - intended;
        }
        self.committed += filled - intended;
    }

    /// Cancelled intent releases its exposure.
    pub fn release(&mut self, instrument_id: &str, group: &str, notional: f64) {
        if let Some(position) = self.exposure.get_mut(instrument_id) {
            position.notional = (position.notional - notional).max(0.0);
            position.pending = position.pending.saturating_sub(1);
            if position.pending == 0 && position.fills == 0 {
                self.exposure.remove(instrument_id);
            }
        }
        if let Some(open) = self.groups.get_mut(group) {
            *open = (*open - notional).max(0.0);
        }
        self.committed = (self.committed - notional).max(0.0);
    }
}

/// Outcome of a risk check
#[derive(Debug)]
pub enum RiskDecision {
    Admitted { notional: f64, capped: bool },
    Rejected(EngineError),
}

impl RiskDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RiskDecision::Admitted { .. })
    }
}

/// Stateless limiter applied per candidate
#[derive(Debug, Clone, Default)]
pub struct RiskLimiter {
    config: RiskConfig,
}

impl RiskLimiter {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Batch-wide halt, if any
    pub fn halt_reason(&self, state: &RiskState) -> Option<HaltReason> {
        if self.config.kill_switch {
            return Some(HaltReason::KillSwitch);
        }
        let limit = self.config.daily_loss_limit_pct * state.day_start_bankroll;
        if state.realized_today <= -limit {
            return Some(HaltReason::DailyLossLimit);
        }
        None
    }

    /// Check a recommended notional for one instrument against the shared limits.
    ///
    /// The cap applies to the instrument and to its correlation `group`; the
    /// size is cut to the remaining room before the bankroll ceiling is checked.
    pub fn evaluate(
        &self,
        state: &RiskState,
        instrument_id: &str,
        group: &str,
        recommended: f64,
    ) -> RiskDecision {
        if let Some(reason) = self.halt_reason(state) {
            warn!(instrument = instrument_id, reason = %reason, "Trading halted");
            return RiskDecision::Rejected(EngineError::Halted(reason));
        }

        if !recommended.is_finite() || recommended <= 0.0 {
            return RiskDecision::Rejected(EngineError::insufficient(
                instrument_id,
                format!("non-positive size ${recommended:.2}"),
            ));
        }

        let cap = self.config.position_cap();
        let existing = state.exposure(instrument_id).max(state.group_exposure(group));
        let room = cap - existing;
        if room <= 1e-9 {
            warn!(instrument = instrument_id, group, existing, cap, "Position full");
            return RiskDecision::Rejected(EngineError::PositionFull {
                instrument: instrument_id.to_string(),
                existing,
                cap,
            });
        }
        let capped = recommended > room;
        let notional = recommended.min(room);

        let available = state.current_bankroll(&self.config);
        if state.committed + notional > available + 1e-9 {
            warn!(
                instrument = instrument_id,
                committed = state.committed,
                notional,
                available,
                "Bankroll ceiling would be exceeded"
            );
            return RiskDecision::Rejected(EngineError::BankrollExceeded {
                instrument: instrument_id.to_string(),
                committed: state.committed,
                requested: notional,
                available,
            });
        }

        debug!(instrument = instrument_id, notional, capped, existing, "Risk admitted");
        RiskDecision::Admitted { notional, capped }
    }
}
