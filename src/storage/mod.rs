//! Persistence layer.
//!
//! Saves and loads the throttle state to/from a JSON file. The journal
//! (`journal.rs`) is the append-only audit log and the fallback source
//! for the last purchase time when the state file is missing or stale.

pub mod journal;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::types::ThrottleState;
use journal::Journal;

/// Save throttle state to a JSON file.
///
/// Writes to a sibling temp file first so a crash mid-write never leaves a
/// truncated state file behind.
pub fn save_state(state: &ThrottleState, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("Failed to serialise throttle state")?;

    let tmp = format!("{path}.tmp");
    std::fs::write(&tmp, &json).with_context(|| format!("Failed to write state to {tmp}"))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to move state into {path}"))?;

    debug!(path, purchases = state.purchases, "State saved");
    Ok(())
}

/// Load throttle state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: &str) -> Result<Option<ThrottleState>> {
    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read state from {path}"))?;

    let state: ThrottleState =
        serde_json::from_str(&json).with_context(|| format!("Failed to parse state from {path}"))?;

    info!(
        path,
        last_buy = ?state.last_buy_time,
        purchases = state.purchases,
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Rebuild the throttle state at startup.
///
/// Starts from the state file when present, then replays the journal and
/// keeps whichever last-purchase time is newer. A missing state file is a
/// fresh start; a corrupt one is an error.
pub fn restore_state(path: &str, journal: &Journal) -> Result<ThrottleState> {
    let mut state = load_state(path)?.unwrap_or_default();
    let replayed = journal.recover_last_buy_time()?;
    if replayed.is_some() && replayed > state.last_buy_time {
        info!(last_buy = ?replayed, "Journal holds a newer purchase than the state file");
    }
    state.merge_recovered(replayed);
    Ok(state)
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        std::fs::remove_file(path).with_context(|| format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PurchaseRecord;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("dipbuyer_test_state_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path();
        let mut state = ThrottleState::new();
        state.record_purchase(PurchaseRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            order_id: "42".into(),
            notional_spent: dec!(15),
            price: dec!(30000),
            quantity: dec!(0.0005),
        });
        save_state(&state, &path).unwrap();

        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.total_quantity, dec!(0.0005));
        assert!(!Path::new(&format!("{path}.tmp")).exists());

        delete_state(&path).unwrap();
    }

    #[test]
    fn test_load_nonexistent() {
        let path = temp_path();
        assert!(load_state(&path).unwrap().is_none());
    }

    #[test]
    fn test_load_minimal_record() {
        // A hand-written file with only the timestamp is accepted.
        let path = temp_path();
        std::fs::write(&path, r#"{"last_buy_time": "2024-01-02T00:00:00Z"}"#).unwrap();
        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(
            loaded.last_buy_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(loaded.purchases, 0);
        delete_state(&path).unwrap();
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let path = temp_path();
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_state(&path).is_err());
        delete_state(&path).unwrap();
    }

    #[test]
    fn test_restore_prefers_newer_journal_entry() {
        let path = temp_path();
        let mut state = ThrottleState::new();
        state.last_buy_time = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        state.purchases = 3;
        save_state(&state, &path).unwrap();

        let journal = Journal::new(format!("{path}.log"));
        journal
            .append_at(
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                crate::types::Level::Info,
                "PURCHASE_OK order=9",
            )
            .unwrap();

        let restored = restore_state(&path, &journal).unwrap();
        assert_eq!(
            restored.last_buy_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(restored.purchases, 3);

        delete_state(&path).unwrap();
        std::fs::remove_file(journal.path()).unwrap();
    }

    #[test]
    fn test_restore_survives_damaged_journal() {
        let path = temp_path();
        let journal = Journal::new(format!("{path}.log"));
        std::fs::write(
            journal.path(),
            b"[2024-01-01 00:00:00] ERROR: bad \xff byte\n\
              [2024-01-02 00:00:00] INFO: PURCHASE_OK order=9\n",
        )
        .unwrap();

        let restored = restore_state(&path, &journal).unwrap();
        assert_eq!(
            restored.last_buy_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        std::fs::remove_file(journal.path()).unwrap();
    }

    #[test]
    fn test_restore_fresh_start() {
        let path = temp_path();
        let journal = Journal::new(format!("{path}.log"));
        assert_eq!(restore_state(&path, &journal).unwrap(), ThrottleState::new());
    }

    #[test]
    fn test_delete_nonexistent_ok() {
        assert!(delete_state(&temp_path()).is_ok());
    }
}
