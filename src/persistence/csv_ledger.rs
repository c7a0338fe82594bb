//! CSV-backed append-only ledger.

use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::{JournalEvent, JournalRecord, LedgerBook, LedgerStore};
use crate::error::{EngineError, Result};
use crate::types::{DailySnapshot, Fill, Resolution, Trade};

const JOURNAL_FILE: &str = "journal.csv";
const SNAPSHOT_FILE: &str = "snapshots.csv";

fn write_failed(context: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::LedgerWriteFailed(format!("{context}: {err}"))
}

/// One append-only CSV file. A row that fails to reach disk is truncated
/// away; if that fails too the file refuses further writes.
struct CsvAppender {
    path: PathBuf,
    writer: csv::Writer<File>,
    poisoned: Option<String>,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl CsvAppender {
    fn open(path: PathBuf) -> Result<Self> {
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
        let writer = Self::writer(&path, !file_has_data)?;
        Ok(Self {
            path,
            writer,
            poisoned: None,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    fn writer(path: &Path, has_headers: bool) -> Result<csv::Writer<File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| write_failed("Failed to open CSV file", e))?;

        Ok(WriterBuilder::new()
            .has_headers(has_headers)
            .from_writer(file))
    }

    fn append<S: Serialize>(&mut self, row: &S) -> Result<()> {
        if let Some(reason) = &self.poisoned {
            return Err(write_failed("Ledger file unusable after failed rollback", reason));
        }
        let committed_len = self
            .writer
            .get_ref()
            .metadata()
            .map_err(|e| write_failed("Failed to stat ledger file", e))?
            .len();

        let written = self
            .writer
            .serialize(row)
            .map_err(|e| write_failed("Failed to write row", e))
            .and_then(|_| self.sync());
        if let Err(err) = written {
            if let Err(rollback) = self.roll_back(committed_len) {
                error!(path = %self.path.display(), error = %rollback, "Ledger rollback failed");
                self.poisoned = Some(rollback.to_string());
            }
            return Err(err);
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| write_failed("Failed to flush ledger", e))?;
        if self.injected_sync_failure() {
            return Err(write_failed("Failed to sync ledger", "injected"));
        }
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| write_failed("Failed to sync ledger", e))
    }

    #[cfg(test)]
    fn injected_sync_failure(&mut self) -> bool {
        std::mem::take(&mut self.fail_next_sync)
    }

    #[cfg(not(test))]
    fn injected_sync_failure(&mut self) -> bool {
        false
    }

    /// Cut the file back to `len` bytes and start a fresh writer.
    fn roll_back(&mut self, len: u64) -> Result<()> {
        // Dropping the old writer flushes whatever it still buffers, so it goes
        // before the truncate.
        let fresh = Self::writer(&self.path, len == 0)?;
        drop(std::mem::replace(&mut self.writer, fresh));

        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| write_failed("Failed to reopen ledger file", e))?;
        file.set_len(len)
            .and_then(|_| file.sync_all())
            .map_err(|e| write_failed("Failed to truncate ledger file", e))?;
        warn!(path = %self.path.display(), len, "Rolled back partial ledger row");
        Ok(())
    }
}

/// Journal and snapshots under `<data_dir>/ledger/`
pub struct CsvLedger {
    dir: PathBuf,
    book: LedgerBook,
    journal: CsvAppender,
    snapshot_writer: CsvAppender,
}

impl std::fmt::Debug for CsvLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvLedger")
            .field("dir", &self.dir)
            .field("trades", &self.book.trades().len())
            .finish()
    }
}

impl CsvLedger {
    /// Open (or create) the ledger and replay the journal.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref().join("ledger");
        fs::create_dir_all(&dir).map_err(|e| write_failed("Failed to create ledger directory", e))?;

        let mut book = LedgerBook::default();
        let journal_path = dir.join(JOURNAL_FILE);
        let mut replayed = 0usize;
        if journal_path.exists() {
            let file = File::open(&journal_path)
                .map_err(|e| write_failed("Failed to open journal", e))?;
            let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
            for result in reader.deserialize() {
                let record: JournalRecord =
                    result.map_err(|e| write_failed("Failed to deserialize journal row", e))?;
                book.apply(record.into_event()?)?;
                replayed += 1;
            }
        }

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        if snapshot_path.exists() {
            let file = File::open(&snapshot_path)
                .map_err(|e| write_failed("Failed to open snapshots", e))?;
            let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
            for result in reader.deserialize() {
                let snapshot: DailySnapshot =
                    result.map_err(|e| write_failed("Failed to deserialize snapshot row", e))?;
                book.insert_snapshot(snapshot);
            }
        }

        let journal = CsvAppender::open(journal_path)?;
        let snapshot_writer = CsvAppender::open(snapshot_path)?;

        info!(
            dir = %dir.display(),
            events = replayed,
            trades = book.trades().len(),
            "Ledger replayed"
        );

        Ok(Self {
            dir,
            book,
            journal,
            snapshot_writer,
        })
    }

    /// Validate, write durably, then apply.
    fn write(&mut self, event: JournalEvent) -> Result<Trade> {
        self.book.check(&event)?;
        let record = JournalRecord::from_event(&event, Utc::now());
        if let Err(err) = self.journal.append(&record) {
            error!(trade_id = %record.trade_id, event = %record.event, error = %err, "Ledger write failed");
            return Err(err);
        }
        self.book.apply(event)
    }
}

impl LedgerStore for CsvLedger {
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
        self.snapshot_writer.append(snapshot)?;
        Ok(self.book.insert_snapshot(snapshot.clone()))
    }

    fn snapshots(&self) -> Vec<DailySnapshot> {
        self.book.snapshots()
    }
}
