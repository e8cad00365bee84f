//! Core domain records consumed by the scheduling subsystem
//!
//! Cameras and timelapses are owned by the external data layer; this crate
//! only ever reads them. The records here carry exactly the fields the
//! timing and readiness logic needs, plus enough identity for log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A physical camera as the scheduler sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: i64,
    pub name: String,
    pub status: CameraStatus,
    pub health_status: CameraHealth,
    pub last_capture_at: Option<DateTime<Utc>>,
}

/// Administrative camera state (set by the operator)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Active,
    Disabled,
}

impl CameraStatus {
    /// Parse a string into a CameraStatus, defaulting to Disabled for unknown values
    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => CameraStatus::Active,
            _ => CameraStatus::Disabled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Active => "active",
            CameraStatus::Disabled => "disabled",
        }
    }
}

/// Observed camera health (maintained by an external health monitor)
///
/// Only `Offline` blocks capture; a degraded or unknown camera is still
/// worth attempting so the rig recovers on its own when the link does.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CameraHealth {
    Online,
    Degraded,
    Offline,
    Unknown,
}

impl CameraHealth {
    /// Parse a string into a CameraHealth, defaulting to Unknown for unknown values
    pub fn from_str(s: &str) -> Self {
        match s {
            "online" => CameraHealth::Online,
            "degraded" => CameraHealth::Degraded,
            "offline" => CameraHealth::Offline,
            _ => CameraHealth::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraHealth::Online => "online",
            CameraHealth::Degraded => "degraded",
            CameraHealth::Offline => "offline",
            CameraHealth::Unknown => "unknown",
        }
    }
}

/// A timelapse as the scheduler sees it
///
/// `time_window_start`/`time_window_end` hold `HH:MM` or `HH:MM:SS` strings
/// exactly as the data layer stores them; parsing happens in the timing
/// calculators so a malformed window is reported, not silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timelapse {
    pub id: i64,
    pub camera_id: i64,
    pub name: String,
    pub status: TimelapseStatus,
    pub capture_interval_seconds: i64,
    pub time_window_start: Option<String>,
    pub time_window_end: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Timelapse lifecycle state
///
/// Both `Running` and `Active` count as capturing states; deployments have
/// historically used either word and the scheduler honors both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TimelapseStatus {
    Running,
    Active,
    Paused,
    Stopped,
    Completed,
}

impl TimelapseStatus {
    /// Parse a string into a TimelapseStatus, defaulting to Stopped for unknown values
    pub fn from_str(s: &str) -> Self {
        match s {
            "running" => TimelapseStatus::Running,
            "active" => TimelapseStatus::Active,
            "paused" => TimelapseStatus::Paused,
            "completed" => TimelapseStatus::Completed,
            _ => TimelapseStatus::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimelapseStatus::Running => "running",
            TimelapseStatus::Active => "active",
            TimelapseStatus::Paused => "paused",
            TimelapseStatus::Stopped => "stopped",
            TimelapseStatus::Completed => "completed",
        }
    }

    /// Whether this state means the timelapse should be capturing
    pub fn is_capturing(&self) -> bool {
        matches!(self, TimelapseStatus::Running | TimelapseStatus::Active)
    }
}

/// Reported by the capture worker once an image has been stored
///
/// The scheduler reacts by enqueueing downstream processing jobs; workers
/// never schedule work themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureCompletedEvent {
    pub timelapse_id: i64,
    pub camera_id: i64,
    pub image_id: i64,
    pub captured_at: DateTime<Utc>,
    pub generate_thumbnail: bool,
    pub generate_overlay: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips() {
        assert_eq!(CameraStatus::from_str("active"), CameraStatus::Active);
        assert_eq!(CameraStatus::from_str("garbage"), CameraStatus::Disabled);
        assert_eq!(CameraHealth::from_str("offline"), CameraHealth::Offline);
        assert_eq!(CameraHealth::from_str(""), CameraHealth::Unknown);
        assert_eq!(
            TimelapseStatus::from_str("running"),
            TimelapseStatus::Running
        );
        assert_eq!(TimelapseStatus::from_str("weird"), TimelapseStatus::Stopped);
    }

    #[test]
    fn test_capturing_states() {
        assert!(TimelapseStatus::Running.is_capturing());
        assert!(TimelapseStatus::Active.is_capturing());
        assert!(!TimelapseStatus::Paused.is_capturing());
        assert!(!TimelapseStatus::Stopped.is_capturing());
        assert!(!TimelapseStatus::Completed.is_capturing());
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&TimelapseStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let health: CameraHealth = serde_json::from_str("\"degraded\"").unwrap();
        assert_eq!(health, CameraHealth::Degraded);
    }
}
