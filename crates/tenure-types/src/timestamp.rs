//! Timestamp encoding at the storage boundary.
//!
//! Written as RFC 3339 in UTC. Older store files carry naive ISO 8601 strings
//! without an offset; those are read as local wall-clock time.

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer, de::Error};

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(s, NAIVE_FORMAT).ok()?;
    let ts = match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Skipped by a DST jump; nothing better than reading it as UTC
        None => Utc.from_utc_datetime(&naive),
    };
    Some(ts)
}

pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(ts))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn rfc3339_round_trip_keeps_sub_second_precision() {
        let ts = Utc::now();
        assert_eq!(parse(&format(&ts)), Some(ts));
    }

    #[test]
    fn naive_strings_are_local_time() {
        let naive = "2024-03-05T10:20:30.123456";
        let expected = Local
            .from_local_datetime(&NaiveDateTime::parse_from_str(naive, NAIVE_FORMAT).unwrap())
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse(naive), Some(expected));
    }

    #[test]
    fn offsets_are_normalised_to_utc() {
        let parsed = parse("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(parsed + Duration::hours(2), Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap());
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse("yesterday"), None);
    }
}
