//! Lenient timestamp decoding.
//!
//! Documents written by different clients store times as RFC 3339 text,
//! bare `YYYY-MM-DD` dates from date pickers, epoch milliseconds, or
//! `{seconds, nanoseconds}` objects. All of them decode to
//! `DateTime<Utc>`; anything else decodes to `None`.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use serde::de::IgnoredAny;

/// Raw timestamp shapes accepted from the store.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
    FloatMillis(f64),
    Parts {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    Other(IgnoredAny),
}

impl RawTimestamp {
    #[allow(clippy::cast_possible_truncation)]
    fn into_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Text(text) => parse_timestamp_text(&text),
            Self::Millis(ms) => DateTime::from_timestamp_millis(ms),
            Self::FloatMillis(ms) if ms.is_finite() => DateTime::from_timestamp_millis(ms as i64),
            Self::Parts {
                seconds,
                nanoseconds,
            } => DateTime::from_timestamp(seconds, nanoseconds),
            Self::FloatMillis(_) | Self::Other(_) => None,
        }
    }
}

/// Parses timestamp text in any of the accepted forms.
///
/// Date-only and zone-less text is interpreted as UTC.
#[must_use]
pub fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    parse_timestamp_text_in(text, &Utc)
}

/// Parses timestamp text, reading date-only and zone-less text as wall
/// time in `tz`. A bare date becomes midnight of that calendar day in
/// `tz`, so it stays on the same day when viewed from there.
///
/// A wall time skipped by a daylight-saving jump resolves to the first
/// valid time after it.
#[must_use]
pub fn parse_timestamp_text_in<Tz: TimeZone>(text: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .into_iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    (0..=2)
        .find_map(|hours| {
            tz.from_local_datetime(&(naive + Duration::hours(hours)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

/// Serde adapter for `Option<DateTime<Utc>>` document fields.
pub mod lenient {
    use super::{DateTime, Deserialize, RawTimestamp, SecondsFormat, Utc};

    /// Writes RFC 3339 with millisecond precision, or `null`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    /// Reads any accepted timestamp shape; unreadable values become `None`.
    ///
    /// # Errors
    ///
    /// Never fails on content; only propagates deserializer I/O errors.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
        Ok(raw.and_then(RawTimestamp::into_datetime))
    }
}
