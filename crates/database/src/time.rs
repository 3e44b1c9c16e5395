//! Timestamp encoding shared by every table.
//!
//! Timestamps are stored as RFC 3339 text with a fixed microsecond precision
//! and a `Z` suffix, so comparing two stored values as strings gives the same
//! answer as comparing the instants they encode.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::types::{DatabaseError, DatabaseResult};

pub fn encode(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now() -> String {
    encode(Utc::now())
}

pub fn decode(value: &str) -> DatabaseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DatabaseError::InvalidTimestamp {
            value: value.to_owned(),
            source,
        })
}

/// Re-encode any RFC 3339 string into the stored representation.
pub fn canonicalise(value: &str) -> DatabaseResult<String> {
    decode(value).map(encode)
}
