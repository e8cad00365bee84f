//! Time utilities for clock-time parsing, signed offsets, and timezone validation

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::errors::{TimingError, TimingResult};

/// Parse a clock-time string in `HH:MM` or `HH:MM:SS` form
///
/// This is the format camera time windows are stored in; anything else is
/// rejected so a typo in a window field surfaces at configuration time
/// instead of silently disabling capture.
pub fn parse_time_of_day(value: &str) -> TimingResult<NaiveTime> {
    let trimmed = value.trim();

    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| TimingError::InvalidWindowFormat {
            value: value.to_string(),
        })
}

/// Parse a signed time offset string like "+1h30m", "-45m", "+5s", "0"
///
/// Used for sunrise/sunset-relative window boundaries ("open 30 minutes
/// after sunrise" = `+30m`). Returns the offset in seconds.
pub fn parse_signed_offset(offset_str: &str) -> TimingResult<i32> {
    let offset_str = offset_str.trim();

    // Handle the simple "0" case or empty string
    if offset_str == "0" || offset_str.is_empty() {
        return Ok(0);
    }

    // Matches patterns like +1h30m, -45m, +5s
    let re = Regex::new(r"^([+-]?)(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$")
        .map_err(|_| TimingError::InvalidOffset {
            value: offset_str.to_string(),
        })?;

    let caps = re
        .captures(offset_str)
        .ok_or_else(|| TimingError::InvalidOffset {
            value: offset_str.to_string(),
        })?;

    let sign = match caps.get(1).map(|m| m.as_str()) {
        Some("-") => -1,
        _ => 1, // Default to positive, handles both "+" and empty
    };

    let hours: i32 = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    let minutes: i32 = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    let seconds: i32 = caps
        .get(4)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    // Keep each component in its natural range and the total inside one day;
    // a window boundary more than 24h from the sun event is a config mistake.
    if hours > 23 || minutes > 59 || seconds > 59 {
        return Err(TimingError::InvalidOffset {
            value: offset_str.to_string(),
        });
    }

    let total_seconds = (hours * 3600) + (minutes * 60) + seconds;
    if total_seconds > 86400 {
        return Err(TimingError::InvalidOffset {
            value: offset_str.to_string(),
        });
    }

    Ok(sign * total_seconds)
}

/// Apply a signed offset to a clock time, wrapping across midnight
///
/// Wrapping is intentional: sunset 23:50 plus "+30m" yields 00:20, which the
/// window calculator then treats as an overnight boundary.
pub fn apply_offset_to_time(t: NaiveTime, offset_seconds: i32) -> NaiveTime {
    if offset_seconds == 0 {
        return t;
    }

    // NaiveTime arithmetic wraps around midnight and discards the day carry,
    // which is exactly the clock-time semantics windows need.
    t + chrono::Duration::seconds(offset_seconds as i64)
}

/// Parse and validate an IANA timezone name
///
/// Only named zones are accepted (no fixed offsets): DST-gap resolution
/// needs the zone's transition table, which a bare offset does not carry.
pub fn validate_timezone(tz_str: &str) -> TimingResult<Tz> {
    tz_str
        .parse::<Tz>()
        .map_err(|_| TimingError::InvalidTimezone {
            value: tz_str.to_string(),
        })
}

/// Format a UTC instant for display in a capture timezone
pub fn format_for_display(utc_time: DateTime<Utc>, tz: Tz) -> String {
    let local_time = utc_time.with_timezone(&tz);
    format!("{} {}", local_time.format("%Y-%m-%d %H:%M:%S"), tz.name())
}
