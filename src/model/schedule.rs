use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// When a job is due to run.
///
/// `Schedule` is an immutable field of [`super::Job`] — a patch replaces it
/// wholesale rather than mutating a field in place, so there is never a
/// moment where e.g. `expr` and `tz` disagree about which variant is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Schedule {
    /// One-shot: fires once at `at_ms` (UTC epoch milliseconds), then done.
    /// Accepts either a raw epoch-millisecond integer or an ISO-8601
    /// timestamp on the wire (unqualified timestamps are read as UTC);
    /// always serializes back out as the integer form.
    At {
        #[serde(deserialize_with = "deserialize_at_ms")]
        at_ms: i64,
    },
    /// Recurring: fires every `every_ms` milliseconds, first due at
    /// `created_at + every_ms`.
    Every { every_ms: i64 },
    /// Recurring: fires on the next instant matching a 5-field cron
    /// expression, evaluated in `tz` (IANA name) or host local time if
    /// `tz` is absent.
    Cron {
        expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
}

impl Schedule {
    /// Cheap shape validation that does not require the engine's
    /// `min_interval` configuration. Full validation (including
    /// `every_ms >= min_interval` and cron parseability) happens in
    /// `crate::store` at ingest, because it needs config and the `cron`
    /// parser respectively.
    pub fn kind(&self) -> &'static str {
        match self {
            Schedule::At { .. } => "at",
            Schedule::Every { .. } => "every",
            Schedule::Cron { .. } => "cron",
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AtMsWire {
    Millis(i64),
    Timestamp(String),
}

fn deserialize_at_ms<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match AtMsWire::deserialize(deserializer)? {
        AtMsWire::Millis(ms) => Ok(ms),
        AtMsWire::Timestamp(s) => parse_at_ms_str(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse an ISO-8601 `at` timestamp into epoch milliseconds. A timestamp
/// carrying an offset (`Z` or `+HH:MM`) is converted to UTC; one without an
/// offset is read as already being UTC.
fn parse_at_ms_str(s: &str) -> Result<i64, String> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }
    Err(format!("invalid ISO-8601 timestamp for `at`: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_ms_accepts_raw_integer() {
        let schedule: Schedule = serde_json::from_str(r#"{"kind":"at","at_ms":1700000000000}"#).unwrap();
        assert_eq!(schedule, Schedule::At { at_ms: 1700000000000 });
    }

    #[test]
    fn at_ms_accepts_offset_iso8601() {
        let schedule: Schedule =
            serde_json::from_str(r#"{"kind":"at","at_ms":"2023-11-14T22:13:20Z"}"#).unwrap();
        assert_eq!(schedule, Schedule::At { at_ms: 1700000000000 });
    }

    #[test]
    fn at_ms_accepts_unqualified_iso8601_as_utc() {
        let schedule: Schedule =
            serde_json::from_str(r#"{"kind":"at","at_ms":"2023-11-14T22:13:20"}"#).unwrap();
        assert_eq!(schedule, Schedule::At { at_ms: 1700000000000 });
    }

    #[test]
    fn at_ms_rejects_unparseable_string() {
        let err = serde_json::from_str::<Schedule>(r#"{"kind":"at","at_ms":"not-a-timestamp"}"#).unwrap_err();
        assert!(err.to_string().contains("invalid ISO-8601"));
    }
}
