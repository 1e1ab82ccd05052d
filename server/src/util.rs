//! Small shared helpers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall clock as milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
