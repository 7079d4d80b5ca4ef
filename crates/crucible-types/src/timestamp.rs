//! Canonical timestamp handling.
//!
//! Every timestamp the system stores or serializes is UTC ISO-8601 with
//! millisecond precision, e.g. `2024-03-15T12:34:56.789`. Lexicographic
//! order of the textual form matches chronological order, which the SQLite
//! backend relies on for its timestamp index.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

use crate::error::TypeError;

/// The canonical millisecond format.
pub const MILLIS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Current wall-clock time, truncated to millisecond precision so that a
/// value survives a trip through the textual form unchanged.
pub fn now() -> DateTime<Utc> {
    let t = Utc::now();
    let millis = t.nanosecond() / 1_000_000;
    t.with_nanosecond(millis * 1_000_000).unwrap_or(t)
}

/// Render a timestamp in the canonical format.
pub fn format_millis(t: &DateTime<Utc>) -> String {
    t.format(MILLIS_FORMAT).to_string()
}

/// Parse a timestamp in the canonical format.
pub fn parse_millis(s: &str) -> Result<DateTime<Utc>, TypeError> {
    NaiveDateTime::parse_from_str(s, MILLIS_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| TypeError::InvalidTimestamp(format!("{s}: {e}")))
}

/// Serde adapter for fields carrying canonical-format timestamps.
pub mod serde_millis {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        t: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_millis(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_millis(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_spec_example() {
        let t = parse_millis("2024-03-15T12:34:56.789").unwrap();
        assert_eq!(format_millis(&t), "2024-03-15T12:34:56.789");
    }

    #[test]
    fn now_roundtrips_through_text() {
        let t = now();
        let parsed = parse_millis(&format_millis(&t)).unwrap();
        assert_eq!(parsed, t);
    }

    #[test]
    fn textual_order_is_chronological() {
        let a = parse_millis("2024-03-15T12:34:56.789").unwrap();
        let b = parse_millis("2024-03-15T12:34:56.790").unwrap();
        assert!(a < b);
        assert!(format_millis(&a) < format_millis(&b));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_millis("not a timestamp").is_err());
    }
}
