//! Default values for configuration fields

use std::time::Duration;

pub fn default_timezone() -> String {
    "UTC".to_string()
}

pub fn default_min_capture_interval() -> Duration {
    Duration::from_secs(5)
}

pub fn default_max_capture_interval() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

pub fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

pub fn default_tick_bounds_min() -> Duration {
    Duration::from_secs(1)
}

pub fn default_tick_bounds_max() -> Duration {
    Duration::from_secs(5 * 60)
}

pub fn default_sync_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

pub fn default_run_missed_immediately() -> bool {
    true
}

pub fn default_startup_jitter_percent() -> u8 {
    25
}

pub fn default_max_pending() -> usize {
    1000
}
