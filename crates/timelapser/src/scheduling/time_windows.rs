//! Daily time-window math for capture scheduling
//!
//! A window is a recurring daily interval during which a camera may capture,
//! given as two clock times. Windows where `start > end` span midnight
//! ("overnight", e.g. 22:00-06:00) and are a normal configuration, not an
//! error. Everything here is pure arithmetic over passed-in values; callers
//! supply the clock.
//!
//! The containment branch in [`is_time_in_window`] is the policy every
//! downstream "is the camera active right now" decision reduces to, so it
//! stays in one place.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::errors::TimingResult;
use crate::utils::time::{apply_offset_to_time, parse_signed_offset, parse_time_of_day};

/// A daily capture window
///
/// Invariant: `is_overnight() == (start > end)`. A window with
/// `start == end` is degenerate and contains exactly that one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether the window wraps across midnight
    pub fn is_overnight(&self) -> bool {
        self.start > self.end
    }

    /// Whether `t` falls inside the window
    pub fn contains(&self, t: NaiveTime) -> bool {
        is_time_in_window(t, self.start, self.end)
    }

    /// Total capture time available per day
    pub fn daily_duration(&self) -> Duration {
        calculate_daily_window_duration(self.start, self.end)
    }

    /// Build a window from stored `HH:MM`/`HH:MM:SS` strings
    pub fn from_strings(start_str: &str, end_str: &str) -> TimingResult<Self> {
        validate_time_window(start_str, end_str)
    }

    /// Build a window from the optional string pair a timelapse record stores
    ///
    /// Both fields absent (or only one present) means no window: capture
    /// around the clock. A present-but-malformed field is an error; silently
    /// ignoring it would quietly remove the operator's night-time fence.
    pub fn from_optional_strings(
        start_str: Option<&str>,
        end_str: Option<&str>,
    ) -> TimingResult<Option<Self>> {
        match (start_str, end_str) {
            (Some(s), Some(e)) => Ok(Some(validate_time_window(s, e)?)),
            _ => Ok(None),
        }
    }

    /// Build a window from externally supplied sunrise/sunset times
    ///
    /// Offsets use the `+30m`/`-1h15m` form; an offset pushing the end past
    /// midnight simply yields an overnight window. Fetching sun times is the
    /// weather collaborator's job, not ours.
    pub fn from_sun_times(
        sunrise: NaiveTime,
        sunset: NaiveTime,
        sunrise_offset: &str,
        sunset_offset: &str,
    ) -> TimingResult<Self> {
        let start = apply_offset_to_time(sunrise, parse_signed_offset(sunrise_offset)?);
        let end = apply_offset_to_time(sunset, parse_signed_offset(sunset_offset)?);
        Ok(Self::new(start, end))
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}{}",
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S"),
            if self.is_overnight() { " (overnight)" } else { "" }
        )
    }
}

/// Whether clock time `t` is inside the window `start..=end`
///
/// Normal window (`start <= end`): `start <= t <= end`, boundaries
/// inclusive. Overnight window (`start > end`): `t >= start || t <= end`.
pub fn is_time_in_window(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start <= t && t <= end
    } else {
        t >= start || t <= end
    }
}

/// Capture time available per day for the window
///
/// Normal windows are `end - start`. Overnight windows sum the evening and
/// morning segments; the trailing `+1s` repairs the second lost between
/// 23:59:59 and 00:00:00 and must stay exactly as-is or capture-count
/// estimates drift. Overnight 22:00-06:00 is exactly 8h, and for any pair
/// the overnight and reversed-normal durations sum to 24h.
pub fn calculate_daily_window_duration(start: NaiveTime, end: NaiveTime) -> Duration {
    if start <= end {
        end - start
    } else {
        let day_start = NaiveTime::MIN;
        let day_end = NaiveTime::from_hms_opt(23, 59, 59).unwrap();
        (day_end - start) + (end - day_start) + Duration::seconds(1)
    }
}

/// The next instant the window begins, relative to `now`
///
/// Inside the window the answer is tomorrow's start; before today's start it
/// is today's; otherwise tomorrow's. Callers clamp missed captures forward
/// to this.
pub fn calculate_next_window_start(
    now: NaiveDateTime,
    start: NaiveTime,
    end: NaiveTime,
) -> NaiveDateTime {
    let today_start = now.date().and_time(start);

    if is_time_in_window(now.time(), start, end) {
        today_start + Duration::days(1)
    } else if now.time() < start {
        today_start
    } else {
        today_start + Duration::days(1)
    }
}

/// The next instant the window ends, relative to `now`
///
/// Handles the overnight wraparound: a window entered this evening ends on
/// tomorrow's calendar day, while the early-morning tail of yesterday's
/// window ends today.
pub fn calculate_next_window_end(
    now: NaiveDateTime,
    start: NaiveTime,
    end: NaiveTime,
) -> NaiveDateTime {
    let today_end = now.date().and_time(end);

    if start <= end {
        if now.time() <= end {
            today_end
        } else {
            today_end + Duration::days(1)
        }
    } else if now.time() >= start {
        // Evening segment: this window runs past midnight
        today_end + Duration::days(1)
    } else if now.time() <= end {
        // Morning tail of the window that started yesterday
        today_end
    } else {
        // Daytime gap: the next window opens tonight and ends tomorrow
        today_end + Duration::days(1)
    }
}

/// Parse and validate a window from its stored string form
///
/// Fails only on unparseable strings; an overnight configuration is valid.
pub fn validate_time_window(start_str: &str, end_str: &str) -> TimingResult<TimeWindow> {
    let start = parse_time_of_day(start_str)?;
    let end = parse_time_of_day(end_str)?;
    Ok(TimeWindow::new(start, end))
}
