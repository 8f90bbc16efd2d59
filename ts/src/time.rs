//! Shared time helpers. Every persisted timestamp in the workspace is a
//! unix-epoch millisecond `i64` so records round-trip through JSON without
//! timezone ambiguity.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as unix-epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
