//! Capture readiness validation
//!
//! The authoritative "may this capture proceed" gate. The scheduler runs
//! this check once before dispatching a capture job; workers trust the
//! verdict and never re-derive timing or camera state themselves. Checks
//! run in a fixed order and short-circuit on the first failure, each
//! failure carrying a distinct `error_type` so operators can tell "camera
//! unplugged" from "just not due yet" in the logs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::capture_timing::{CaptureTimingCalculator, DueReason};
use super::time_windows::TimeWindow;
use crate::errors::AppResult;
use crate::models::{Camera, CameraHealth, CameraStatus, Timelapse};
use crate::repositories::{CameraRepository, TimelapseRepository};

/// Sentinel camera id: resolve the camera from the timelapse record
///
/// Scheduler-internal callers often only know the timelapse; passing this
/// makes the validator look the camera up itself.
pub const CAMERA_ID_FROM_TIMELAPSE: i64 = 0;

/// Why a capture may not proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessErrorKind {
    CameraNotFound,
    CameraDisabled,
    CameraOffline,
    TimelapseNotFound,
    TimelapseNotActive,
    CaptureNotDue,
    OutsideTimeWindow,
    ValidationError,
}

impl ReadinessErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessErrorKind::CameraNotFound => "camera_not_found",
            ReadinessErrorKind::CameraDisabled => "camera_disabled",
            ReadinessErrorKind::CameraOffline => "camera_offline",
            ReadinessErrorKind::TimelapseNotFound => "timelapse_not_found",
            ReadinessErrorKind::TimelapseNotActive => "timelapse_not_active",
            ReadinessErrorKind::CaptureNotDue => "capture_not_due",
            ReadinessErrorKind::OutsideTimeWindow => "outside_time_window",
            ReadinessErrorKind::ValidationError => "validation_error",
        }
    }
}

impl std::fmt::Display for ReadinessErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The single object a dispatch decision is built on
///
/// Created fresh per evaluation and discarded; never persisted. A blocked
/// readiness is the normal steady-state of a healthy scheduler (most ticks
/// are "not due yet"), so it is not an error in the `Result` sense.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureReadiness {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ReadinessErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<Camera>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timelapse: Option<Timelapse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_capture_time: Option<DateTime<Utc>>,
}

impl CaptureReadiness {
    /// A capture may proceed
    pub fn ready(camera: Camera, timelapse: Timelapse, next_capture_time: DateTime<Utc>) -> Self {
        Self {
            valid: true,
            error: None,
            error_type: None,
            camera: Some(camera),
            timelapse: Some(timelapse),
            next_capture_time: Some(next_capture_time),
        }
    }

    /// A capture must not proceed
    pub fn blocked(kind: ReadinessErrorKind, error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            error_type: Some(kind),
            camera: None,
            timelapse: None,
            next_capture_time: None,
        }
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_timelapse(mut self, timelapse: Timelapse) -> Self {
        self.timelapse = Some(timelapse);
        self
    }

    pub fn with_next_capture(mut self, at: DateTime<Utc>) -> Self {
        self.next_capture_time = Some(at);
        self
    }
}

/// Runs the full admission check for a capture dispatch
pub struct CaptureReadinessValidator {
    cameras: Arc<dyn CameraRepository>,
    timelapses: Arc<dyn TimelapseRepository>,
    calculator: CaptureTimingCalculator,
}

impl CaptureReadinessValidator {
    pub fn new(
        cameras: Arc<dyn CameraRepository>,
        timelapses: Arc<dyn TimelapseRepository>,
        calculator: CaptureTimingCalculator,
    ) -> Self {
        Self {
            cameras,
            timelapses,
            calculator,
        }
    }

    /// Evaluate readiness against the current clock
    pub async fn evaluate(&self, camera_id: i64, timelapse_id: i64) -> CaptureReadiness {
        self.evaluate_at(camera_id, timelapse_id, Utc::now()).await
    }

    /// Evaluate readiness at an explicit instant
    ///
    /// Never returns an error: internal faults (data layer down, corrupt
    /// interval, malformed window string) are folded into a blocked
    /// readiness with `error_type = validation_error`. The caller is a
    /// scheduler tick that must keep running no matter what.
    pub async fn evaluate_at(
        &self,
        camera_id: i64,
        timelapse_id: i64,
        now: DateTime<Utc>,
    ) -> CaptureReadiness {
        match self.evaluate_inner(camera_id, timelapse_id, now).await {
            Ok(readiness) => {
                if let Some(kind) = readiness.error_type {
                    debug!(
                        "Capture blocked for timelapse {}: {} ({})",
                        timelapse_id,
                        readiness.error.as_deref().unwrap_or(""),
                        kind
                    );
                }
                readiness
            }
            Err(e) => {
                warn!(
                    "Readiness validation failed internally for timelapse {}: {}",
                    timelapse_id, e
                );
                CaptureReadiness::blocked(ReadinessErrorKind::ValidationError, e.to_string())
            }
        }
    }

    async fn evaluate_inner(
        &self,
        camera_id: i64,
        timelapse_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<CaptureReadiness> {
        // Resolve the camera from the timelapse when the caller only knows
        // the timelapse. The record is kept so it is not fetched twice.
        let mut prefetched: Option<Timelapse> = None;
        let camera_id = if camera_id == CAMERA_ID_FROM_TIMELAPSE {
            match self.timelapses.get_timelapse_by_id(timelapse_id).await? {
                Some(timelapse) => {
                    let resolved = timelapse.camera_id;
                    prefetched = Some(timelapse);
                    resolved
                }
                None => {
                    return Ok(CaptureReadiness::blocked(
                        ReadinessErrorKind::TimelapseNotFound,
                        format!("Timelapse {timelapse_id} not found"),
                    ));
                }
            }
        } else {
            camera_id
        };

        let camera = match self.cameras.get_camera_by_id(camera_id).await? {
            Some(camera) => camera,
            None => {
                return Ok(CaptureReadiness::blocked(
                    ReadinessErrorKind::CameraNotFound,
                    format!("Camera {camera_id} not found"),
                ));
            }
        };

        if camera.status != CameraStatus::Active {
            return Ok(CaptureReadiness::blocked(
                ReadinessErrorKind::CameraDisabled,
                format!("Camera '{}' is disabled", camera.name),
            )
            .with_camera(camera));
        }

        if camera.health_status == CameraHealth::Offline {
            return Ok(CaptureReadiness::blocked(
                ReadinessErrorKind::CameraOffline,
                format!("Camera '{}' is offline", camera.name),
            )
            .with_camera(camera));
        }

        let timelapse = match prefetched {
            Some(timelapse) => Some(timelapse),
            None => self.timelapses.get_timelapse_by_id(timelapse_id).await?,
        };
        let Some(timelapse) = timelapse else {
            return Ok(CaptureReadiness::blocked(
                ReadinessErrorKind::TimelapseNotFound,
                format!("Timelapse {timelapse_id} not found"),
            )
            .with_camera(camera));
        };

        if !timelapse.status.is_capturing() {
            return Ok(CaptureReadiness::blocked(
                ReadinessErrorKind::TimelapseNotActive,
                format!(
                    "Timelapse '{}' is {}",
                    timelapse.name,
                    timelapse.status.as_str()
                ),
            )
            .with_camera(camera)
            .with_timelapse(timelapse));
        }

        // A corrupt interval or malformed window string propagates as an
        // internal fault; both come from stored records, not user input.
        let interval_seconds = self
            .calculator
            .validate_capture_interval(timelapse.capture_interval_seconds)?;
        let window = TimeWindow::from_optional_strings(
            timelapse.time_window_start.as_deref(),
            timelapse.time_window_end.as_deref(),
        )?;

        let verdict = self.calculator.is_capture_due(
            camera.last_capture_at,
            Duration::seconds(interval_seconds),
            window.as_ref(),
            now,
        );

        if verdict.is_due {
            return Ok(CaptureReadiness::ready(
                camera,
                timelapse,
                verdict.next_capture_time,
            ));
        }

        let blocked = match verdict.reason {
            DueReason::OutsideWindow => {
                let description = window
                    .as_ref()
                    .map(|w| format!("Current time is outside capture window {w}"))
                    .unwrap_or_else(|| "Current time is outside the capture window".to_string());
                CaptureReadiness::blocked(ReadinessErrorKind::OutsideTimeWindow, description)
            }
            _ => CaptureReadiness::blocked(
                ReadinessErrorKind::CaptureNotDue,
                match verdict.time_since_last_seconds {
                    Some(since) => format!(
                        "Capture not due: {since}s since last capture, interval {interval_seconds}s"
                    ),
                    None => format!("Capture not due yet (interval {interval_seconds}s)"),
                },
            ),
        };

        Ok(blocked
            .with_camera(camera)
            .with_timelapse(timelapse)
            .with_next_capture(verdict.next_capture_time))
    }
}
