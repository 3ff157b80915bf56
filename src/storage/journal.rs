//! Append-only run journal.
//!
//! One line per event: `[YYYY-MM-DD HH:MM:SS] LEVEL: message`, timestamps
//! in UTC. Successful purchases carry the `PURCHASE_OK` marker so the last
//! purchase time can be recovered by replaying the file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Prefix of journal lines for simulated purchases.
pub const DRY_RUN_MARKER: &str = "DRY_RUN";

use crate::strategy::throttle::{recover_last_buy_time, PURCHASE_MARKER, TIMESTAMP_FORMAT};
use crate::types::{Level, PurchaseRecord};

pub struct Journal {
    path: PathBuf,
}

/// Render one journal line (without the trailing newline).
pub fn format_line(at: DateTime<Utc>, level: Level, message: &str) -> String {
    // Keep one event per line so replay stays line-oriented.
    let message = message.replace(['\n', '\r'], " ");
    format!("[{}] {}: {}", at.format(TIMESTAMP_FORMAT), level.label(), message)
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a line stamped with the current time.
    pub fn append(&self, level: Level, message: &str) -> Result<()> {
        self.append_at(Utc::now(), level, message)
    }

    pub fn append_at(&self, at: DateTime<Utc>, level: Level, message: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open journal {}", self.path.display()))?;
        writeln!(file, "{}", format_line(at, level, message))
            .with_context(|| format!("Failed to append to journal {}", self.path.display()))?;
        Ok(())
    }

    /// Append without propagating failures; the journal is an audit trail
    /// and a broken disk must not stop the loop.
    pub fn record(&self, level: Level, message: &str) {
        if let Err(e) = self.append(level, message) {
            warn!(error = format!("{e:#}"), "Journal write failed");
        }
    }

    /// Append the purchase line used for recovery, stamped with the fill time.
    pub fn record_purchase(&self, purchase: &PurchaseRecord) -> Result<()> {
        self.append_at(
            purchase.timestamp,
            Level::Info,
            &format!("{PURCHASE_MARKER} {purchase}"),
        )
    }

    /// Journal a dry-run fill. The line carries no recovery marker.
    pub fn record_simulated_purchase(&self, purchase: &PurchaseRecord) {
        self.record(Level::Info, &format!("{DRY_RUN_MARKER} {purchase}"));
    }

    /// All lines in file order. A missing journal reads as empty.
    ///
    /// Invalid UTF-8 is replaced rather than rejected: a damaged line must
    /// not hide the purchase lines around it.
    pub fn read_lines(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Journal not found, treating as empty");
            return Ok(Vec::new());
        }
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read journal {}", self.path.display()))?;
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect())
    }

    /// Most recent purchase time found in the journal.
    pub fn recover_last_buy_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(recover_last_buy_time(&self.read_lines()?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
