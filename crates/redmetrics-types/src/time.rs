//! Wire date codec.
//!
//! The service stores instants as ISO-8601 UTC strings with millisecond
//! precision (`2015-06-01T12:30:00.250Z`). Query filters and entities,
//! however, are handled as local wall-clock values: on write the local
//! fields are sent as if they were UTC fields, and on read the UTC fields
//! are handed back unchanged as local fields. No timezone offset is applied
//! in either direction, so [`encode`] and [`decode`] are exact inverses of
//! each other (down to the millisecond) even though neither is a true
//! local/UTC conversion.
//!
//! `userTime` stamps on outgoing records are the one exception: they carry
//! the real current instant, see [`now`].

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::TypesError;

/// Format used when a wire date arrives without an offset.
const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Encode local wall-clock fields as a wire date string.
///
/// The fields are reinterpreted as UTC fields, so `2020-03-04 05:06:07.089`
/// becomes `"2020-03-04T05:06:07.089Z"` regardless of the local timezone.
/// Sub-millisecond precision is truncated.
pub fn encode(local: NaiveDateTime) -> String {
    local.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decode a wire date string into local wall-clock fields.
///
/// The UTC fields of the instant become the local fields of the result.
/// Strings carrying a non-UTC offset are normalized to UTC first. A string
/// without any offset is read as UTC fields directly.
///
/// # Errors
///
/// Returns [`TypesError::InvalidDate`] if the string is not an ISO-8601
/// date-time.
pub fn decode(wire: &str) -> Result<NaiveDateTime, TypesError> {
    match DateTime::parse_from_rfc3339(wire) {
        Ok(instant) => Ok(instant.naive_utc()),
        Err(rfc_err) => {
            NaiveDateTime::parse_from_str(wire, NAIVE_FORMAT).map_err(|_naive_err| {
                TypesError::InvalidDate {
                    value: wire.to_owned(),
                    reason: rfc_err.to_string(),
                }
            })
        }
    }
}

/// The current instant in wire date format.
///
/// Used for the `userTime` stamp applied when a record is enqueued.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
