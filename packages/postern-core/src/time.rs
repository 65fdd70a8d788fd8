//! Time utilities shared by the pipelines and the key store.

use chrono::DateTime;

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Parse an RFC 2822 `Date` header value into a Unix timestamp.
///
/// Dates in the future are clamped to the current time so a sender cannot
/// pin a peerstate by back-dating its own clock forward. Returns `None` for
/// values that do not parse.
pub fn parse_message_date(value: &str) -> Option<i64> {
    let parsed = DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let timestamp = parsed.timestamp();
    let now = now_timestamp();
    Some(timestamp.min(now))
}
