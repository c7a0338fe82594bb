//! In-memory ledger for tests and dry runs.

use super::{JournalEvent, LedgerBook, LedgerStore};
use crate::error::{EngineError, Result};
use crate::types::{DailySnapshot, Fill, Resolution, Trade};

/// Ledger held entirely in memory, with optional write-failure injection
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    book: LedgerBook,
    fail_writes: bool,
    writes: usize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `LedgerWriteFailed`
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Number of successful journal writes
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn write(&mut self, event: JournalEvent) -> Result<Trade> {
        self.book.check(&event)?;
        if self.fail_writes {
            return Err(EngineError::LedgerWriteFailed(format!(
                "injected failure writing {}",
                event.trade_id()
            )));
        }
        let trade = self.book.apply(event)?;
        self.writes += 1;
        Ok(trade)
    }
}

impl LedgerStore for MemoryLedger {
    fn append_intent(&mut self, trade: &Trade) -> Result<()> {
        self.write(JournalEvent::Intent(trade.clone())).map(|_| ())
    }

    fn mark_filled(&mut self, trade_id: &str, fill: &Fill) -> Result<Trade> {
        self.write(JournalEvent::Fill {
            trade_id: trade_id.to_string(),
            fill: *fill,
        })
    }

    fn mark_cancelled(&mut self, trade_id: &str, reason: &str) -> Result<Trade> {
        self.write(JournalEvent::Cancel {
            trade_id: trade_id.to_string(),
            reason: reason.to_string(),
        })
    }

    fn record_resolution(&mut self, trade_id: &str, resolution: &Resolution) -> Result<Trade> {
        self.write(JournalEvent::Resolve {
            trade_id: trade_id.to_string(),
            resolution: resolution.clone(),
        })
    }

    fn trades(&self) -> Vec<Trade> {
        self.book.trades().to_vec()
    }

    fn trade(&self, trade_id: &str) -> Option<Trade> {
        self.book.trade(trade_id).cloned()
    }

    fn write_snapshot(&mut self, snapshot: &DailySnapshot) -> Result<bool> {
        if self.book.has_snapshot(snapshot.snapshot_date) {
            return Ok(false);
        }
        if self.fail_writes {
            return Err(EngineError::LedgerWriteFailed(format!(
                "injected failure writing snapshot {}",
                snapshot.snapshot_date
            )));
        }
        Ok(self.book.insert_snapshot(snapshot.clone()))
    }

    fn snapshots(&self) -> Vec<DailySnapshot> {
        self.book.snapshots()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn injected_failure_leaves_state_untouched() {
        let mut ledger = MemoryLedger::new();
        ledger.set_fail_writes(true);
        let err = ledger.append_intent(&sample_trade("t1")).unwrap_err();
        assert!(matches!(err, EngineError::LedgerWriteFailed(_)));
        assert!(ledger.trades().is_empty());

        ledger.set_fail_writes(false);
        ledger.append_intent(&sample_trade("t1")).unwrap();
        assert_eq!(ledger.write_count(), 1);
    }
}
