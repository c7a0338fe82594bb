//! Ledger persistence
//!
//! The ledger is an append-only journal of trade events (intent, fill, cancel,
//! resolution). Trade state is never overwritten; it is rebuilt by replaying the
//! journal through [`LedgerBook`], which also enforces the status machine.

mod csv_ledger;
mod memory;

pub use csv_ledger::CsvLedger;
pub use memory::MemoryLedger;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{EngineError, Result};
use crate::polymarket::Side;
use crate::types::{
    BucketOutcome, DailySnapshot, Fill, Metric, Resolution, ResolutionSource, Trade, TradeContext,
    TradeStatus,
};

/// Storage seam for the trade ledger. Every write is durable before it returns.
pub trait LedgerStore: Send {
    /// Log a new pending intent
    fn append_intent(&mut self, trade: &Trade) -> Result<()>;
    /// Move a pending trade to filled
    fn mark_filled(&mut self, trade_id: &str, fill: &Fill) -> Result<Trade>;
    /// Move a pending trade to cancelled
    fn mark_cancelled(&mut self, trade_id: &str, reason: &str) -> Result<Trade>;
    /// Set resolution fields on a filled trade, exactly once
    fn record_resolution(&mut self, trade_id: &str, resolution: &Resolution) -> Result<Trade>;
    /// Snapshot of every trade in creation order
    fn trades(&self) -> Vec<Trade>;
    fn trade(&self, trade_id: &str) -> Option<Trade>;
    /// Write a daily snapshot; returns false if one already exists for the date
    fn write_snapshot(&mut self, snapshot: &DailySnapshot) -> Result<bool>;
    fn snapshots(&self) -> Vec<DailySnapshot>;
}

// ─────────────────────────────────────────────────────────────────
// Journal events
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum JournalEvent {
    Intent(Trade),
    Fill { trade_id: String, fill: Fill },
    Cancel { trade_id: String, reason: String },
    Resolve { trade_id: String, resolution: Resolution },
}

impl JournalEvent {
    pub fn trade_id(&self) -> &str {
        match self {
            JournalEvent::Intent(trade) => &trade.id,
            JournalEvent::Fill { trade_id, .. }
            | JournalEvent::Cancel { trade_id, .. }
            | JournalEvent::Resolve { trade_id, .. } => trade_id,
        }
    }
}

/// Flat CSV row for one journal event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalRecord {
    pub recorded_at: String,
    pub event: String,
    pub trade_id: String,
    #[serde(default)]
    pub instrument_id: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub bucket_label: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub decision_price: Option<f64>,
    #[serde(default)]
    pub notional: Option<f64>,
    #[serde(default)]
    pub modeled_probability: Option<f64>,
    #[serde(default)]
    pub edge: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub venue_event_ref: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub bucket_lower: Option<f64>,
    #[serde(default)]
    pub bucket_upper: Option<f64>,
    #[serde(default)]
    pub bucket_positive: Option<bool>,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub fill_price: Option<f64>,
    #[serde(default)]
    pub fill_shares: Option<f64>,
    #[serde(default)]
    pub fill_notional: Option<f64>,
    #[serde(default)]
    pub levels_consumed: Option<usize>,
    #[serde(default)]
    pub best_price: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payout: Option<f64>,
    #[serde(default)]
    pub realized_pnl: Option<f64>,
    #[serde(default)]
    pub resolution_source: Option<String>,
    #[serde(default)]
    pub observed_value: Option<f64>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl JournalRecord {
    pub fn from_event(event: &JournalEvent, recorded_at: DateTime<Utc>) -> Self {
        let mut record = JournalRecord {
            recorded_at: recorded_at.to_rfc3339(),
            trade_id: event.trade_id().to_string(),
            ..Default::default()
        };
        match event {
            JournalEvent::Intent(trade) => {
                record.event = "intent".to_string();
                record.instrument_id = Some(trade.instrument_id.clone());
                record.event_id = Some(trade.event_id.clone());
                record.bucket_label = Some(trade.bucket_label.clone());
                record.side = Some(trade.side.to_string());
                record.decision_price = Some(trade.decision_price);
                record.notional = Some(trade.notional);
                record.modeled_probability = Some(trade.modeled_probability);
                record.edge = Some(trade.edge);
                record.created_at = Some(trade.created_at.to_rfc3339());
                record.venue_event_ref = trade.context.venue_event_ref.clone();
                record.location = Some(trade.context.location.clone());
                record.metric = Some(trade.context.metric.to_string());
                match trade.context.outcome {
                    BucketOutcome::Range { lower, upper } => {
                        record.bucket_lower = lower;
                        record.bucket_upper = upper;
                    }
                    BucketOutcome::Boolean { positive } => record.bucket_positive = Some(positive),
                }
                record.event_date = Some(trade.context.event_date.to_string());
                record.status = Some(TradeStatus::Pending.to_string());
            }
            JournalEvent::Fill { fill, .. } => {
                record.event = "fill".to_string();
                record.fill_price = Some(fill.price);
                record.fill_shares = Some(fill.shares);
                record.fill_notional = Some(fill.notional);
                record.levels_consumed = Some(fill.levels_consumed);
                record.best_price = Some(fill.best_price);
                record.created_at = Some(fill.filled_at.to_rfc3339());
                record.status = Some(TradeStatus::Filled.to_string());
            }
            JournalEvent::Cancel { reason, .. } => {
                record.event = "cancel".to_string();
                record.status = Some(TradeStatus::Cancelled.to_string());
                record.detail = Some(reason.clone());
            }
            JournalEvent::Resolve { resolution, .. } => {
                record.event = "resolution".to_string();
                record.status = Some(resolution.status.to_string());
                record.payout = Some(resolution.payout);
                record.realized_pnl = Some(resolution.realized_pnl);
                record.resolution_source = Some(resolution.source.to_string());
                record.observed_value = resolution.observed_value;
                record.created_at = Some(resolution.resolved_at.to_rfc3339());
            }
        }
        record
    }

    pub fn into_event(self) -> Result<JournalEvent> {
        let trade_id = self.trade_id.clone();
        let bad = |field: &str| {
            EngineError::LedgerWriteFailed(format!(
                "journal row for {trade_id} has missing or invalid {field}"
            ))
        };
        match self.event.as_str() {
            "intent" => {
                let outcome = match self.bucket_positive {
                    Some(positive) => BucketOutcome::Boolean { positive },
                    None => BucketOutcome::Range {
                        lower: self.bucket_lower,
                        upper: self.bucket_upper,
                    },
                };
                let trade = Trade {
                    id: self.trade_id.clone(),
                    instrument_id: self.instrument_id.clone().ok_or_else(|| bad("instrument_id"))?,
                    event_id: self.event_id.clone().ok_or_else(|| bad("event_id"))?,
                    bucket_label: self.bucket_label.clone().unwrap_or_default(),
                    side: self
                        .side
                        .as_deref()
                        .and_then(Side::from_text)
                        .ok_or_else(|| bad("side"))?,
                    decision_price: self.decision_price.ok_or_else(|| bad("decision_price"))?,
                    notional: self.notional.ok_or_else(|| bad("notional"))?,
                    modeled_probability: self.modeled_probability.unwrap_or_default(),
                    edge: self.edge.unwrap_or_default(),
                    status: TradeStatus::Pending,
                    created_at: parse_time(self.created_at.as_deref()).ok_or_else(|| bad("created_at"))?,
                    context: TradeContext {
                        venue_event_ref: self.venue_event_ref.clone(),
                        location: self.location.clone().unwrap_or_default(),
                        metric: self
                            .metric
                            .as_deref()
                            .and_then(Metric::from_str)
                            .ok_or_else(|| bad("metric"))?,
                        outcome,
                        event_date: self
                            .event_date
                            .as_deref()
                            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                            .ok_or_else(|| bad("event_date"))?,
                    },
                    fill: None,
                    resolution: None,
                };
                Ok(JournalEvent::Intent(trade))
            }
            "fill" => Ok(JournalEvent::Fill {
                fill: Fill {
                    price: self.fill_price.ok_or_else(|| bad("fill_price"))?,
                    shares: self.fill_shares.ok_or_else(|| bad("fill_shares"))?,
                    notional: self.fill_notional.ok_or_else(|| bad("fill_notional"))?,
                    levels_consumed: self.levels_consumed.unwrap_or_default(),
                    best_price: self.best_price.unwrap_or_default(),
                    filled_at: parse_time(self.created_at.as_deref()).ok_or_else(|| bad("filled_at"))?,
                },
                trade_id: self.trade_id,
            }),
            "cancel" => Ok(JournalEvent::Cancel {
                reason: self.detail.unwrap_or_default(),
                trade_id: self.trade_id,
            }),
            "resolution" => Ok(JournalEvent::Resolve {
                resolution: Resolution {
                    status: self
                        .status
                        .as_deref()
                        .and_then(TradeStatus::from_str)
                        .ok_or_else(|| bad("status"))?,
                    payout: self.payout.ok_or_else(|| bad("payout"))?,
                    realized_pnl: self.realized_pnl.ok_or_else(|| bad("realized_pnl"))?,
                    source: match self.resolution_source.as_deref() {
                        Some("venue") => ResolutionSource::Venue,
                        Some("observation") => ResolutionSource::Observation,
                        _ => return Err(bad("resolution_source")),
                    },
                    observed_value: self.observed_value,
                    resolved_at: parse_time(self.created_at.as_deref())
                        .ok_or_else(|| bad("resolved_at"))?,
                },
                trade_id: self.trade_id,
            }),
            other => Err(EngineError::LedgerWriteFailed(format!(
                "unknown journal event '{other}' for {trade_id}"
            ))),
        }
    }
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ─────────────────────────────────────────────────────────────────
// Replayed state
// ─────────────────────────────────────────────────────────────────

/// In-memory trade state rebuilt from journal events
#[derive(Debug, Clone, Default)]
pub struct LedgerBook {
    trades: Vec<Trade>,
    index: HashMap<String, usize>,
    snapshots: BTreeMap<NaiveDate, DailySnapshot>,
}

impl LedgerBook {
    /// Validate an event against current state without applying it
    pub fn check(&self, event: &JournalEvent) -> Result<()> {
        let trade_id = event.trade_id();
        let existing = self.index.get(trade_id).map(|&i| &self.trades[i]);

        let invalid = |from: TradeStatus, to: &str| EngineError::InvalidTransition {
            trade_id: trade_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        };

        match (event, existing) {
            (JournalEvent::Intent(trade), None) => {
                if trade.status != TradeStatus::Pending {
                    return Err(invalid(trade.status, "pending"));
                }
                Ok(())
            }
            (JournalEvent::Intent(_), Some(current)) => Err(invalid(current.status, "pending")),
            (_, None) => Err(EngineError::UnknownTrade(trade_id.to_string())),
            (JournalEvent::Fill { .. }, Some(current)) => match current.status {
                TradeStatus::Pending => Ok(()),
                from => Err(invalid(from, "filled")),
            },
            (JournalEvent::Cancel { .. }, Some(current)) => match current.status {
                TradeStatus::Pending => Ok(()),
                from => Err(invalid(from, "cancelled")),
            },
            (JournalEvent::Resolve { resolution, .. }, Some(current)) => {
                if current.resolution.is_some() || current.status.is_resolved() {
                    return Err(EngineError::AlreadyResolved(trade_id.to_string()));
                }
                if current.status != TradeStatus::Filled {
                    return Err(invalid(current.status, &resolution.status.to_string()));
                }
                if !resolution.status.is_resolved() {
                    return Err(invalid(current.status, &resolution.status.to_string()));
                }
                Ok(())
            }
        }
    }

    /// Validate and apply; returns the updated trade
    pub fn apply(&mut self, event: JournalEvent) -> Result<Trade> {
        self.check(&event)?;
        let updated = match event {
            JournalEvent::Intent(trade) => {
                self.index.insert(trade.id.clone(), self.trades.len());
                self.trades.push(trade);
                self.trades.len() - 1
            }
            JournalEvent::Fill { trade_id, fill } => {
                let i = self.index[&trade_id];
                self.trades[i].fill = Some(fill);
                self.trades[i].status = TradeStatus::Filled;
                i
            }
            JournalEvent::Cancel { trade_id, .. } => {
                let i = self.index[&trade_id];
                self.trades[i].status = TradeStatus::Cancelled;
                i
            }
            JournalEvent::Resolve {
                trade_id,
                resolution,
            } => {
                let i = self.index[&trade_id];
                self.trades[i].status = resolution.status;
                self.trades[i].resolution = Some(resolution);
                i
            }
        };
        Ok(self.trades[updated].clone())
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn trade(&self, trade_id: &str) -> Option<&Trade> {
        self.index.get(trade_id).map(|&i| &self.trades[i])
    }

    pub fn has_snapshot(&self, date: NaiveDate) -> bool {
        self.snapshots.contains_key(&date)
    }

    /// Insert unless a snapshot already exists for the date
    pub fn insert_snapshot(&mut self, snapshot: DailySnapshot) -> bool {
        if self.has_snapshot(snapshot.snapshot_date) {
            return false;
        }
        self.snapshots.insert(snapshot.snapshot_date, snapshot);
        true
    }

    pub fn snapshots(&self) -> Vec<DailySnapshot> {
        self.snapshots.values().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────
// Reporting
// ─────────────────────────────────────────────────────────────────

/// Ledger rollup for the report command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerReport {
    pub total_trades: usize,
    pub pending: usize,
    pub filled: usize,
    pub cancelled: usize,
    pub wins: usize,
    pub losses: usize,
    pub voids: usize,
    pub win_rate: f64,
    pub cumulative_pnl: f64,
    pub open_notional: f64,
    pub open_positions: usize,
    pub snapshots: Vec<DailySnapshot>,
}

impl LedgerReport {
    pub fn build(store: &dyn LedgerStore) -> Self {
        let trades = store.trades();
        let mut report = LedgerReport {
            total_trades: trades.len(),
            snapshots: store.snapshots(),
            ..Default::default()
        };
        let mut open_instruments = std::collections::HashSet::new();

        for trade in &trades {
            match trade.status {
                TradeStatus::Pending => report.pending += 1,
                TradeStatus::Filled => report.filled += 1,
                TradeStatus::Cancelled => report.cancelled += 1,
                TradeStatus::ResolvedWin => report.wins += 1,
                TradeStatus::ResolvedLoss => report.losses += 1,
                TradeStatus::Void => report.voids += 1,
            }
            if trade.status.is_open() {
                report.open_notional += trade.committed_notional();
                open_instruments.insert(trade.instrument_id.as_str());
            }
            report.cumulative_pnl += trade.realized_pnl();
        }

        report.open_positions = open_instruments.len();
        let decided = report.wins + report.losses;
        if decided > 0 {
            report.win_rate = report.wins as f64 / decided as f64;
        }
        report
    }
}

impl std::fmt::Display for LedgerReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Trades:          {}", self.total_trades)?;
        writeln!(
            f,
            "  pending {} | filled {} | cancelled {}",
            self.pending, self.filled, self.cancelled
        )?;
        writeln!(
            f,
            "  wins {} | losses {} | void {}",
            self.wins, self.losses, self.voids
        )?;
        writeln!(f, "Win rate:        {:.1}%", self.win_rate * 100.0)?;
        writeln!(f, "Cumulative P&L:  ${:.2}", self.cumulative_pnl)?;
        writeln!(
            f,
            "Open:            {} position(s), ${:.2} at risk",
            self.open_positions, self.open_notional
        )?;
        for snap in &self.snapshots {
            writeln!(
                f,
                "  {}  cash ${:.2}  at-risk ${:.2}  pnl ${:.2}  trades {}  open {}",
                snap.snapshot_date,
                snap.cash,
                snap.at_risk,
                snap.realized_pnl,
                snap.trade_count,
                snap.open_positions
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn sample_trade(id: &str) -> Trade {
        Trade {
            id: id.to_string(),
            instrument_id: "m1".to_string(),
            event_id: "evt".to_string(),
            bucket_label: "70-71".to_string(),
            side: Side::No,
            decision_price: 0.55,
            notional: 40.0,
            modeled_probability: 0.8,
            edge: -0.25,
            status: TradeStatus::Pending,
            created_at: Utc::now(),
            context: TradeContext {
                venue_event_ref: Some("venue-evt".to_string()),
                location: "NYC".to_string(),
                metric: Metric::TemperatureHigh,
                outcome: BucketOutcome::between(70.0, 72.0),
                event_date: NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(),
            },
            fill: None,
            resolution: None,
        }
    }

    pub fn sample_fill() -> Fill {
        Fill {
            price: 0.56,
            shares: 40.0 / 0.56,
            notional: 40.0,
            levels_consumed: 2,
            best_price: 0.55,
            filled_at: Utc::now(),
        }
    }

    pub fn sample_resolution() -> Resolution {
        Resolution {
            status: TradeStatus::ResolvedWin,
            payout: 1.0,
            realized_pnl: 40.0 / 0.56 - 40.0,
            source: ResolutionSource::Venue,
            observed_value: None,
            resolved_at: Utc::now(),
        }
    }
}
