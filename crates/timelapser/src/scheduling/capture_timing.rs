//! Next-capture arithmetic, due/not-due decisions, and interval validation
//!
//! [`CaptureTimingCalculator`] is the synchronous core of the scheduler:
//! everything here is a pure function of its arguments plus the typed
//! [`TimingSettings`] it was constructed with. The async world resolves
//! settings once at the boundary ([`TimingSettings::resolve`]) and then
//! calls into this with plain values, so there is exactly one copy of the
//! timing rules.
//!
//! All public timestamps are `DateTime<Utc>`; the configured capture
//! timezone is only consulted internally for window membership and for
//! constructing wall-clock times (window starts), which is where DST gaps
//! live.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono::offset::LocalResult;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::TimingConfig;
use crate::errors::{TimingError, TimingResult};
use crate::repositories::{SettingsProvider, setting_keys};
use crate::scheduling::time_windows::{TimeWindow, calculate_next_window_start};
use crate::utils::time::validate_timezone;

/// Typed timing settings, resolved once from the settings provider
///
/// The calculators never see raw strings; anything unparseable has already
/// been replaced by a default (with a warning) by the time this exists.
#[derive(Debug, Clone)]
pub struct TimingSettings {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub grace_period: Duration,
    pub timezone: Tz,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::seconds(5),
            max_interval: Duration::hours(24),
            grace_period: Duration::seconds(5),
            timezone: Tz::UTC,
        }
    }
}

impl TimingSettings {
    /// Build settings from the static config file values only
    pub fn from_config(config: &TimingConfig) -> Self {
        let timezone = match validate_timezone(&config.default_timezone) {
            Ok(tz) => tz,
            Err(e) => {
                warn!("Configured default timezone rejected ({e}), falling back to UTC");
                Tz::UTC
            }
        };

        Self {
            min_interval: Duration::seconds(config.min_capture_interval.as_secs() as i64),
            max_interval: Duration::seconds(config.max_capture_interval.as_secs() as i64),
            grace_period: Duration::seconds(config.default_grace_period.as_secs() as i64),
            timezone,
        }
    }

    /// Resolve settings from the provider, falling back to config defaults
    ///
    /// Missing keys are normal (fresh install); unparseable values are
    /// logged and ignored rather than failing startup.
    pub async fn resolve(provider: &dyn SettingsProvider, defaults: &TimingConfig) -> Self {
        let mut settings = Self::from_config(defaults);

        if let Some(secs) = lookup_seconds(provider, setting_keys::MIN_CAPTURE_INTERVAL).await {
            settings.min_interval = Duration::seconds(secs);
        }
        if let Some(secs) = lookup_seconds(provider, setting_keys::MAX_CAPTURE_INTERVAL).await {
            settings.max_interval = Duration::seconds(secs);
        }
        if let Some(secs) = lookup_seconds(provider, setting_keys::GRACE_PERIOD).await {
            settings.grace_period = Duration::seconds(secs);
        }

        match provider.get_setting(setting_keys::TIMEZONE).await {
            Ok(Some(raw)) => match validate_timezone(raw.trim()) {
                Ok(tz) => settings.timezone = tz,
                Err(e) => warn!("Ignoring stored timezone setting: {e}"),
            },
            Ok(None) => {}
            Err(e) => warn!(
                "Settings lookup for '{}' failed: {e}",
                setting_keys::TIMEZONE
            ),
        }

        settings
    }
}

async fn lookup_seconds(provider: &dyn SettingsProvider, key: &str) -> Option<i64> {
    match provider.get_setting(key).await {
        Ok(Some(raw)) => match raw.trim().parse::<i64>() {
            Ok(secs) if secs >= 0 => Some(secs),
            _ => {
                warn!("Ignoring unparseable setting {key}='{raw}'");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!("Settings lookup for '{key}' failed: {e}");
            None
        }
    }
}

/// Why a due-check came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueReason {
    /// No prior capture recorded; the first one is always due
    FirstCapture,
    /// The configured interval (less grace) has elapsed
    IntervalElapsed,
    /// Inside the window but the interval has not yet elapsed
    WaitingForInterval,
    /// Outside the configured time window, elapsed time irrelevant
    OutsideWindow,
}

impl std::fmt::Display for DueReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DueReason::FirstCapture => "first_capture",
            DueReason::IntervalElapsed => "interval_elapsed",
            DueReason::WaitingForInterval => "waiting_for_interval",
            DueReason::OutsideWindow => "outside_window",
        };
        write!(f, "{s}")
    }
}

/// The result of a single due-check evaluation
///
/// Recomputed fresh on every call and never persisted; two evaluations with
/// identical inputs produce identical verdicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDueVerdict {
    pub is_due: bool,
    pub next_capture_time: DateTime<Utc>,
    pub reason: DueReason,
    pub time_since_last_seconds: Option<i64>,
}

/// Pure capture-timing calculator over typed settings
#[derive(Debug, Clone)]
pub struct CaptureTimingCalculator {
    settings: TimingSettings,
}

impl CaptureTimingCalculator {
    pub fn new(settings: TimingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TimingSettings {
        &self.settings
    }

    pub fn timezone(&self) -> Tz {
        self.settings.timezone
    }

    /// The next time a capture should run after `current`
    ///
    /// Base case is `current + interval`. If that lands outside the window
    /// (in the capture timezone) the result is clamped forward to the next
    /// window start - not merely delayed by another interval, which is what
    /// lets a camera re-enter its window instead of drifting past it day
    /// after day. Interval arithmetic itself happens in UTC, so only the
    /// clamp path constructs wall-clock times that can hit a DST gap; those
    /// are resolved before returning.
    pub fn calculate_next_capture_time(
        &self,
        current: DateTime<Utc>,
        interval: Duration,
        window: Option<&TimeWindow>,
    ) -> DateTime<Utc> {
        let base = current + interval;

        if let Some(w) = window {
            let local_base = base.with_timezone(&self.settings.timezone);
            if !w.contains(local_base.time()) {
                let next_start = calculate_next_window_start(local_base.naive_local(), w.start, w.end);
                return self.resolve_local_after(next_start, current);
            }
        }

        base
    }

    /// Estimated number of captures over `period` (planning/UI only)
    pub fn calculate_capture_count_for_duration(
        &self,
        period: Duration,
        interval: Duration,
        window: Option<&TimeWindow>,
    ) -> i64 {
        let interval_secs = interval.num_seconds();
        if interval_secs <= 0 {
            return 0;
        }

        match window {
            None => (period.num_seconds() / interval_secs).max(0),
            Some(w) => {
                let per_day = w.daily_duration().num_seconds() / interval_secs;
                per_day * period.num_days().max(0)
            }
        }
    }

    /// Validate a requested capture interval against the configured bounds
    ///
    /// The error carries the violated bound so callers can show a concrete
    /// correction instead of "invalid value".
    pub fn validate_capture_interval(&self, seconds: i64) -> TimingResult<i64> {
        let min = self.settings.min_interval.num_seconds();
        let max = self.settings.max_interval.num_seconds();

        if seconds < min {
            return Err(TimingError::IntervalTooShort { seconds, min });
        }
        if seconds > max {
            return Err(TimingError::IntervalTooLong { seconds, max });
        }
        Ok(seconds)
    }

    /// Decide whether a capture is due right now
    ///
    /// The window is checked before the interval: a camera whose interval
    /// elapsed hours ago but which sits outside its window is correctly
    /// not-due. Without a prior capture the first one is always due. The
    /// grace period widens the due window toward "early" so a tick that
    /// fires a couple of seconds ahead of schedule is not rejected.
    pub fn is_capture_due(
        &self,
        last_capture: Option<DateTime<Utc>>,
        interval: Duration,
        window: Option<&TimeWindow>,
        now: DateTime<Utc>,
    ) -> CaptureDueVerdict {
        let time_since_last_seconds = last_capture.map(|last| (now - last).num_seconds());
        let next_capture_time =
            self.calculate_next_capture_for_camera(last_capture, interval, window, now);

        if let Some(w) = window {
            let local_now = now.with_timezone(&self.settings.timezone);
            if !w.contains(local_now.time()) {
                return CaptureDueVerdict {
                    is_due: false,
                    next_capture_time,
                    reason: DueReason::OutsideWindow,
                    time_since_last_seconds,
                };
            }
        }

        let Some(last) = last_capture else {
            return CaptureDueVerdict {
                is_due: true,
                next_capture_time,
                reason: DueReason::FirstCapture,
                time_since_last_seconds,
            };
        };

        let elapsed = now - last;
        if elapsed >= interval - self.settings.grace_period {
            CaptureDueVerdict {
                is_due: true,
                next_capture_time,
                reason: DueReason::IntervalElapsed,
                time_since_last_seconds,
            }
        } else {
            CaptureDueVerdict {
                is_due: false,
                next_capture_time,
                reason: DueReason::WaitingForInterval,
                time_since_last_seconds,
            }
        }
    }

    /// Next capture time for a camera, covering the first-capture case
    ///
    /// With no prior capture: `now` when inside the window (or no window),
    /// otherwise the next window start. With a prior capture, delegates to
    /// [`Self::calculate_next_capture_time`] from that capture.
    pub fn calculate_next_capture_for_camera(
        &self,
        last_capture: Option<DateTime<Utc>>,
        interval: Duration,
        window: Option<&TimeWindow>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match last_capture {
            None => {
                if let Some(w) = window {
                    let local_now = now.with_timezone(&self.settings.timezone);
                    if !w.contains(local_now.time()) {
                        let next_start =
                            calculate_next_window_start(local_now.naive_local(), w.start, w.end);
                        return self.resolve_local_after(next_start, now);
                    }
                }
                now
            }
            Some(last) => self.calculate_next_capture_time(last, interval, window),
        }
    }

    /// Resolve a wall-clock time in the capture timezone to a UTC instant
    ///
    /// Spring-forward gaps (the wall time never occurs) advance in
    /// 15-minute steps to the first representable time, so a 02:30 landing
    /// in a 02:00->03:00 gap resolves to 03:00. Fall-back overlaps (the
    /// wall time occurs twice) take the earlier instant unless it is not
    /// after `floor`, in which case the later one keeps the result strictly
    /// in the future.
    fn resolve_local_after(&self, naive: NaiveDateTime, floor: DateTime<Utc>) -> DateTime<Utc> {
        let tz = self.settings.timezone;

        let mut candidate = naive;
        // Real-world transitions are at most a few hours; 16 steps covers 4h.
        for _ in 0..16 {
            match tz.from_local_datetime(&candidate) {
                LocalResult::Single(dt) => return dt.with_timezone(&Utc),
                LocalResult::Ambiguous(earlier, later) => {
                    let earlier = earlier.with_timezone(&Utc);
                    if earlier > floor {
                        return earlier;
                    }
                    return later.with_timezone(&Utc);
                }
                LocalResult::None => {
                    candidate += Duration::minutes(15);
                }
            }
        }

        // Pathological zone data; treat the wall time as UTC rather than stall.
        warn!(
            "Could not resolve local time {naive} in {}; interpreting as UTC",
            tz.name()
        );
        Utc.from_utc_datetime(&naive)
    }
}
