//! Storage utility functions.

use chrono::Utc;

/// Current datetime as string in SQLite format.
pub fn current_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Keep a stored timestamp, or stamp a fresh one when it is missing or empty.
pub fn timestamp_or_now(existing: Option<&String>) -> String {
    existing
        .filter(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(current_timestamp)
}
