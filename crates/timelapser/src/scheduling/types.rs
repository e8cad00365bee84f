//! Scheduling type definitions
//!
//! The shared vocabulary of the scheduling subsystem: job priorities, the
//! kinds of work the scheduler can dispatch, queue entries, and the
//! structured result records the authority hands back to its callers
//! (typically an HTTP layer that translates them 1:1 into responses).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Priority levels for job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPriority {
    /// Cancellations and recovery operations
    Critical = 0,
    /// Manual user triggers ("capture now", "generate video")
    High = 1,
    /// Regular scheduled captures
    Normal = 2,
    /// Downstream processing (thumbnails, overlays)
    Low = 3,
    /// Background housekeeping
    Maintenance = 4,
}

impl PartialOrd for JobPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JobPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

/// The kinds of work the scheduler dispatches to downstream workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// Capture one frame for a timelapse
    ///
    /// Carries the resolved camera so workers do not re-derive it; a
    /// positive readiness verdict already happened by the time this exists.
    Capture { camera_id: i64, timelapse_id: i64 },
    /// Assemble a video for a timelapse, with optional encoder settings
    VideoGeneration {
        timelapse_id: i64,
        settings: Option<serde_json::Value>,
    },
    /// Render the overlay for a stored image
    OverlayGeneration { image_id: i64 },
    /// Render the thumbnail for a stored image
    ThumbnailGeneration { image_id: i64 },
    /// Tell the video worker to stop work on a video
    VideoCancellation { video_id: i64, target_job_id: String },
}

impl JobKind {
    /// Generate a unique key for deduplication
    /// Jobs with the same key will be deduplicated
    pub fn job_key(&self) -> String {
        match self {
            JobKind::Capture { timelapse_id, .. } => format!("capture:{timelapse_id}"),
            JobKind::VideoGeneration { timelapse_id, .. } => format!("video:{timelapse_id}"),
            JobKind::OverlayGeneration { image_id } => format!("overlay:{image_id}"),
            JobKind::ThumbnailGeneration { image_id } => format!("thumbnail:{image_id}"),
            JobKind::VideoCancellation { video_id, .. } => format!("video_cancel:{video_id}"),
        }
    }

    /// Short name for logs and result records
    pub fn kind_name(&self) -> &'static str {
        match self {
            JobKind::Capture { .. } => "capture",
            JobKind::VideoGeneration { .. } => "video_generation",
            JobKind::OverlayGeneration { .. } => "overlay_generation",
            JobKind::ThumbnailGeneration { .. } => "thumbnail_generation",
            JobKind::VideoCancellation { .. } => "video_cancellation",
        }
    }

    /// The timelapse this job belongs to, where that makes sense
    pub fn timelapse_id(&self) -> Option<i64> {
        match self {
            JobKind::Capture { timelapse_id, .. }
            | JobKind::VideoGeneration { timelapse_id, .. } => Some(*timelapse_id),
            _ => None,
        }
    }
}

/// A queued job awaiting pickup by a downstream worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    /// Unique job instance identifier
    pub id: Uuid,
    /// What to do
    pub kind: JobKind,
    /// When this job becomes eligible to run
    pub scheduled_at: DateTime<Utc>,
    /// Priority level for execution ordering
    pub priority: JobPriority,
}

impl QueuedJob {
    /// Create a job eligible to run immediately
    pub fn new(kind: JobKind, priority: JobPriority) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            scheduled_at: Utc::now(),
            priority,
        }
    }

    /// Create a job eligible to run at a specific time
    pub fn new_at(kind: JobKind, priority: JobPriority, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            scheduled_at,
            priority,
        }
    }

    /// Get the deduplication key for this job
    pub fn job_key(&self) -> String {
        self.kind.job_key()
    }

    /// Check if this job is eligible to run
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    /// Jobs are ordered by priority first, then by eligibility time
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => self.scheduled_at.cmp(&other.scheduled_at),
            priority_order => priority_order,
        }
    }
}

/// Result of a recurring-job command (`add`/`update`/`remove
/// timelapse job`)
///
/// The authority never raises; failures land in `error` with
/// `success = false` so an HTTP caller can translate directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelapseJobResult {
    pub success: bool,
    pub timelapse_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TimelapseJobResult {
    pub fn ok(timelapse_id: i64, job_id: String, interval_seconds: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            timelapse_id,
            job_id: Some(job_id),
            interval_seconds,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn err(timelapse_id: i64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            timelapse_id,
            job_id: None,
            interval_seconds: None,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Result of a `schedule_immediate_*` command
///
/// The identifier fields echo whatever the command was given; absent ones
/// are omitted from the serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmediateJobResult {
    pub success: bool,
    pub job_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timelapse_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImmediateJobResult {
    pub fn ok(job_kind: &str, job_id: String, message: impl Into<String>) -> Self {
        Self {
            success: true,
            job_kind: job_kind.to_string(),
            job_id: Some(job_id),
            camera_id: None,
            timelapse_id: None,
            image_id: None,
            video_id: None,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn err(job_kind: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            job_kind: job_kind.to_string(),
            job_id: None,
            camera_id: None,
            timelapse_id: None,
            image_id: None,
            video_id: None,
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn with_camera(mut self, camera_id: i64) -> Self {
        self.camera_id = Some(camera_id);
        self
    }

    pub fn with_timelapse(mut self, timelapse_id: i64) -> Self {
        self.timelapse_id = Some(timelapse_id);
        self
    }

    pub fn with_image(mut self, image_id: i64) -> Self {
        self.image_id = Some(image_id);
        self
    }

    pub fn with_video(mut self, video_id: i64) -> Self {
        self.video_id = Some(video_id);
        self
    }
}

/// Outcome of a reconciliation pass over running timelapses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub success: bool,
    /// Jobs registered for timelapses that had none
    pub added: usize,
    /// Jobs removed because their timelapse is no longer running
    pub removed: usize,
    /// Jobs re-registered because their interval drifted from the record
    pub updated: usize,
    /// Timelapses that could not be scheduled (bad interval, bad window)
    pub failed: usize,
    /// Running timelapses seen in the data layer
    pub total_running: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Jobs enqueued in response to a completed capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamJobsResult {
    pub success: bool,
    pub image_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_job_priority_ordering() {
        assert!(JobPriority::Critical < JobPriority::High);
        assert!(JobPriority::High < JobPriority::Normal);
        assert!(JobPriority::Normal < JobPriority::Low);
        assert!(JobPriority::Low < JobPriority::Maintenance);
    }

    #[test]
    fn test_job_kind_key_generation() {
        let capture = JobKind::Capture {
            camera_id: 3,
            timelapse_id: 7,
        };
        let video = JobKind::VideoGeneration {
            timelapse_id: 7,
            settings: None,
        };
        let overlay = JobKind::OverlayGeneration { image_id: 42 };
        let thumbnail = JobKind::ThumbnailGeneration { image_id: 42 };
        let cancel = JobKind::VideoCancellation {
            video_id: 9,
            target_job_id: "immediate_video_7".to_string(),
        };

        assert_eq!(capture.job_key(), "capture:7");
        assert_eq!(video.job_key(), "video:7");
        assert_eq!(overlay.job_key(), "overlay:42");
        assert_eq!(thumbnail.job_key(), "thumbnail:42");
        assert_eq!(cancel.job_key(), "video_cancel:9");

        // Same timelapse -> same capture key, regardless of camera
        let other_camera = JobKind::Capture {
            camera_id: 99,
            timelapse_id: 7,
        };
        assert_eq!(capture.job_key(), other_camera.job_key());
    }

    #[test]
    fn test_queued_job_ordering() {
        let now = Utc::now();

        // Higher priority (lower enum value) sorts first even if later
        let critical_job = QueuedJob::new_at(
            JobKind::VideoCancellation {
                video_id: 1,
                target_job_id: "j".to_string(),
            },
            JobPriority::Critical,
            now + Duration::hours(1),
        );
        let normal_job = QueuedJob::new_at(
            JobKind::Capture {
                camera_id: 1,
                timelapse_id: 1,
            },
            JobPriority::Normal,
            now,
        );
        assert!(critical_job < normal_job);

        // Same priority: earlier eligibility first
        let earlier = QueuedJob::new_at(
            JobKind::ThumbnailGeneration { image_id: 1 },
            JobPriority::Low,
            now,
        );
        let later = QueuedJob::new_at(
            JobKind::ThumbnailGeneration { image_id: 2 },
            JobPriority::Low,
            now + Duration::minutes(10),
        );
        assert!(earlier < later);
    }

    #[test]
    fn test_job_is_ready() {
        let now = Utc::now();

        let ready = QueuedJob::new_at(
            JobKind::OverlayGeneration { image_id: 1 },
            JobPriority::Low,
            now - Duration::minutes(1),
        );
        let future = QueuedJob::new_at(
            JobKind::OverlayGeneration { image_id: 2 },
            JobPriority::Low,
            now + Duration::minutes(1),
        );

        assert!(ready.is_ready(now));
        assert!(!future.is_ready(now));
    }

    #[test]
    fn test_result_records_serialize_compactly() {
        let result = ImmediateJobResult::ok("capture", "immediate_capture_7".to_string(), "scheduled")
            .with_camera(3)
            .with_timelapse(7);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["camera_id"], 3);
        // Unset identifier fields are omitted entirely
        assert!(json.get("image_id").is_none());
        assert!(json.get("error").is_none());
    }
}
