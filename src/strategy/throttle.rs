//! Purchase throttle.
//!
//! Enforces the cooldown between purchases and recovers the last
//! purchase time by replaying the journal newest-first.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Substring identifying a successful-purchase journal line.
pub const PURCHASE_MARKER: &str = "PURCHASE_OK";

/// Journal timestamp layout inside the leading brackets.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse the leading `[YYYY-MM-DD HH:MM:SS]` of a journal line as UTC.
pub fn parse_line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let rest = line.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    NaiveDateTime::parse_from_str(&rest[..end], TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Timestamp of the most recent purchase line, scanning from the end.
///
/// Marker lines whose timestamp cannot be parsed are skipped.
pub fn recover_last_buy_time<S: AsRef<str>>(lines: &[S]) -> Option<DateTime<Utc>> {
    lines
        .iter()
        .rev()
        .map(AsRef::as_ref)
        .filter(|line| line.contains(PURCHASE_MARKER))
        .find_map(parse_line_timestamp)
}

pub fn is_throttled(now: DateTime<Utc>, last_buy_time: Option<DateTime<Utc>>, cooldown: Duration) -> bool {
    remaining_cooldown(now, last_buy_time, cooldown).is_some()
}

/// Time left before the next purchase is allowed, if any.
pub fn remaining_cooldown(
    now: DateTime<Utc>,
    last_buy_time: Option<DateTime<Utc>>,
    cooldown: Duration,
) -> Option<Duration> {
    let elapsed = now - last_buy_time?;
    (elapsed < cooldown).then(|| cooldown - elapsed)
}
