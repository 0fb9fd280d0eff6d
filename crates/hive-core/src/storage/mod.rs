//! SQLite storage

mod database;

use chrono::{DateTime, SecondsFormat, Utc};

pub use database::Database;

/// Fixed-width RFC 3339 so text ordering matches time ordering
pub(crate) fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
