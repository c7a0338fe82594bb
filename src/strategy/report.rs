//! Structured cycle outputs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clob::OrderBook;
use crate::error::{EngineError, HaltReason};
use crate::resolver::ResolutionSummary;
use crate::types::{DailySnapshot, Signal, Trade, TradeContext};

/// Pipeline stage a candidate was dropped at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipStage {
    Scan,
    Risk,
    Execution,
}

impl fmt::Display for SkipStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipStage::Scan => write!(f, "scan"),
            SkipStage::Risk => write!(f, "risk"),
            SkipStage::Execution => write!(f, "execution"),
        }
    }
}

/// One rejected or skipped candidate, with the inputs that led there
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRecord {
    pub stage: SkipStage,
    pub event_id: String,
    pub instrument_id: Option<String>,
    /// Stable error code, e.g. POSITION_FULL
    pub reason: String,
    pub detail: String,
    pub edge: Option<f64>,
    pub notional: Option<f64>,
}

impl SkipRecord {
    pub fn new(stage: SkipStage, event_id: &str, instrument_id: Option<&str>, err: &EngineError) -> Self {
        Self {
            stage,
            event_id: event_id.to_string(),
            instrument_id: instrument_id.map(str::to_string),
            reason: err.code().to_string(),
            detail: err.to_string(),
            edge: None,
            notional: None,
        }
    }

    pub fn with_inputs(mut self, edge: f64, notional: f64) -> Self {
        self.edge = Some(edge);
        self.notional = Some(notional);
        self
    }
}

/// A sized signal plus what execution needs to act on it
#[derive(Debug, Clone)]
pub struct Candidate {
    pub signal: Signal,
    pub context: TradeContext,
    pub book: OrderBook,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub events_seen: usize,
    pub events_modeled: usize,
    pub buckets_evaluated: usize,
    /// Qualifying signals beyond the per-event limit
    pub dropped_by_bucket_limit: usize,
    /// Events whose sizes were scaled down to fit one position cap
    pub budget_scaled: usize,
    /// Ordered shortest horizon first, then by |edge|
    pub candidates: Vec<Candidate>,
    pub skips: Vec<SkipRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteReport {
    pub filled: Vec<Trade>,
    pub cancelled: Vec<Trade>,
    /// Admissions reduced to the instrument's remaining room
    pub capped: usize,
    pub skips: Vec<SkipRecord>,
    pub halted: Option<HaltReason>,
    pub snapshot: Option<DailySnapshot>,
}

impl ExecuteReport {
    pub fn deployed(&self) -> f64 {
        self.filled.iter().map(Trade::committed_notional).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub resolution: ResolutionSummary,
    pub scan: ScanReport,
    pub execution: ExecuteReport,
}

impl CycleReport {
    pub fn skips(&self) -> impl Iterator<Item = &SkipRecord> {
        self.scan.skips.iter().chain(self.execution.skips.iter())
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.resolution;
        writeln!(
            f,
            "Resolved {} (W{} / L{} / V{}), pnl ${:.2}; {} pending date, {} unavailable",
            r.resolved, r.wins, r.losses, r.voids, r.total_pnl, r.skipped_future, r.unavailable
        )?;
        writeln!(
            f,
            "Scanned {} event(s), modeled {}, {} bucket(s), {} signal(s)",
            self.scan.events_seen,
            self.scan.events_modeled,
            self.scan.buckets_evaluated,
            self.scan.candidates.len()
        )?;
        if let Some(reason) = self.execution.halted {
            writeln!(f, "HALTED: {reason}")?;
        }
        writeln!(
            f,
            "Filled {} (${:.2}), cancelled {}, capped {}",
            self.execution.filled.len(),
            self.execution.deployed(),
            self.execution.cancelled.len(),
            self.execution.capped
        )?;
        for trade in &self.execution.filled {
            writeln!(
                f,
                "  {} {} {} ${:.2} @ {:.4}",
                trade.id,
                trade.side,
                trade.bucket_label,
                trade.committed_notional(),
                trade.entry_price()
            )?;
        }
        for skip in self.skips() {
            writeln!(
                f,
                "  skip [{}] {} {}: {}",
                skip.stage,
                skip.instrument_id.as_deref().unwrap_or(&skip.event_id),
                skip.reason,
                skip.detail
            )?;
        }
        Ok(())
    }
}
