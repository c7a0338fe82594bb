//! Paper Executor
//!
//! Simulates a taker fill by walking the resting book of the side being bought.
//!
//! Key behavior:
//! - **Ladder walk**: YES buys lift YES asks; NO buys hit YES bids mirrored to `1 - p`
//! - **VWAP**: fill price is filled notional over shares acquired
//! - **Depth and slippage guards**: a short book or a VWAP too far from the best
//!   level rejects the fill instead of trading through it
//! - **Pending first**: only an intent already logged as pending can be filled

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clob::{BookLevel, OrderBook};
use crate::error::{EngineError, Result};
use crate::types::{Fill, Trade, TradeStatus};

// ─────────────────────────────────────────────────────────────────
// Book walk
// ─────────────────────────────────────────────────────────────────

/// Result of consuming a ladder up to a target notional
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookWalk {
    pub target_notional: f64,
    pub filled_notional: f64,
    pub shares: f64,
    pub levels_consumed: usize,
    pub best_price: Option<f64>,
}

impl BookWalk {
    pub fn vwap(&self) -> Option<f64> {
        if self.shares > 0.0 {
            Some(self.filled_notional / self.shares)
        } else {
            None
        }
    }

    pub fn is_complete(&self) -> bool {
        self.filled_notional + 1e-9 >= self.target_notional
    }

    /// |vwap - best| / best
    pub fn slippage(&self) -> Option<f64> {
        match (self.vwap(), self.best_price) {
            (Some(vwap), Some(best)) if best > 0.0 => Some((vwap - best).abs() / best),
            _ => None,
        }
    }
}

/// Consume `ladder` (best first) until `target_notional` dollars are spent.
/// A partially consumed level contributes only the notional still needed.
pub fn walk_book(ladder: &[BookLevel], target_notional: f64) -> BookWalk {
    let mut walk = BookWalk {
        target_notional,
        filled_notional: 0.0,
        shares: 0.0,
        levels_consumed: 0,
        best_price: ladder.first().map(|level| level.price),
    };

    for level in ladder {
        let remaining = target_notional - walk.filled_notional;
        if remaining <= 1e-9 {
            break;
        }
        let take = level.notional().min(remaining);
        walk.filled_notional += take;
        walk.shares += take / level.price;
        walk.levels_consumed += 1;
    }

    walk
}

// ─────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────

/// Outcome of a paper fill attempt
#[derive(Debug)]
pub enum FillOutcome {
    Filled(Fill),
    Rejected(EngineError),
}

/// Paper executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperExecutorConfig {
    /// Maximum |vwap - best| / best tolerated (e.g., 0.05 = 5%)
    pub max_slippage_pct: f64,
}

impl Default for PaperExecutorConfig {
    fn default() -> Self {
        Self {
            max_slippage_pct: 0.05,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaperExecutor {
    config: PaperExecutorConfig,
}

impl PaperExecutor {
    pub fn new(config: PaperExecutorConfig) -> Self {
        Self { config }
    }

    /// Simulate filling a pending trade against `book`.
    ///
    /// Errors only when the trade is not pending; market-driven refusals come
    /// back as `FillOutcome::Rejected`.
    pub fn fill(&self, trade: &Trade, book: &OrderBook, now: DateTime<Utc>) -> Result<FillOutcome> {
        if trade.status != TradeStatus::Pending {
            return Err(EngineError::InvalidTransition {
                trade_id: trade.id.clone(),
                from: trade.status.to_string(),
                to: TradeStatus::Filled.to_string(),
            });
        }

        let ladder = book.buy_ladder(trade.side);
        let walk = walk_book(&ladder, trade.notional);

        let (vwap, best) = match (walk.vwap(), walk.best_price) {
            (Some(vwap), Some(best)) if walk.is_complete() => (vwap, best),
            _ => {
                warn!(
                    instrument = %trade.instrument_id,
                    filled = walk.filled_notional,
                    notional = trade.notional,
                    levels = ladder.len(),
                    "Insufficient depth"
                );
                return Ok(FillOutcome::Rejected(EngineError::InsufficientDepth {
                    instrument: trade.instrument_id.clone(),
                    filled: walk.filled_notional,
                    requested: trade.notional,
                }));
            }
        };

        let slippage = walk.slippage().unwrap_or(0.0);
        if slippage > self.config.max_slippage_pct {
            warn!(
                instrument = %trade.instrument_id,
                vwap,
                best,
                slippage,
                max = self.config.max_slippage_pct,
                "Excessive slippage"
            );
            return Ok(FillOutcome::Rejected(EngineError::ExcessiveSlippage {
                instrument: trade.instrument_id.clone(),
                vwap,
                best,
                slippage,
            }));
        }

        let fill = Fill {
            price: vwap,
            shares: walk.shares,
            notional: walk.filled_notional,
            levels_consumed: walk.levels_consumed,
            best_price: best,
            filled_at: now,
        };

        info!(
            trade_id = %trade.id,
            instrument = %trade.instrument_id,
            side = %trade.side,
            vwap,
            shares = fill.shares,
            notional = fill.notional,
            levels = fill.levels_consumed,
            "Paper fill"
        );

        Ok(FillOutcome::Filled(fill))
    }
}
