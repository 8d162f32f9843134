//! Conversion of chain-native timestamps into the event time format.
//!
//! Every event carries its block time as a UTC civil timestamp, `YYYY-MM-DD HH:MM:SS`.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Format string of [`crate::models::Event::time`]
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Seconds between the Unix epoch and the Ripple epoch (2000-01-01T00:00:00Z)
pub const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

/// Formats Unix seconds.
pub fn from_unix_seconds(seconds: i64) -> Option<String> {
	DateTime::<Utc>::from_timestamp(seconds, 0).map(|dt| dt.format(EVENT_TIME_FORMAT).to_string())
}

/// Formats Unix milliseconds, dropping the sub-second part.
pub fn from_unix_millis(millis: i64) -> Option<String> {
	from_unix_seconds(millis.div_euclid(1000))
}

/// Formats seconds since the Ripple epoch.
pub fn from_ripple_seconds(seconds: i64) -> Option<String> {
	from_unix_seconds(seconds + RIPPLE_EPOCH_OFFSET)
}

/// Formats an RFC 3339 timestamp such as `2024-03-01T12:00:00.123456Z`.
pub fn from_rfc3339(value: &str) -> Option<String> {
	DateTime::parse_from_rfc3339(value)
		.ok()
		.map(|dt| dt.with_timezone(&Utc).format(EVENT_TIME_FORMAT).to_string())
}

/// Current time; mempool events carry the time they were observed.
pub fn now() -> String {
	Utc::now().format(EVENT_TIME_FORMAT).to_string()
}

/// Parses an event time back into Unix seconds.
pub fn to_unix_seconds(value: &str) -> Option<i64> {
	NaiveDateTime::parse_from_str(value, EVENT_TIME_FORMAT)
		.ok()
		.map(|dt| dt.and_utc().timestamp())
}
