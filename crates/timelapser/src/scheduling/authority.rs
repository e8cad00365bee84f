//! Scheduler authority: the single chokepoint for all scheduled work
//!
//! Every recurring capture job, immediate trigger, and downstream
//! processing job passes through this one component. Workers never
//! schedule anything themselves; they execute queued jobs and report
//! completions back here. Command methods return structured result
//! records instead of raising, so an HTTP layer can translate them
//! 1:1 into responses.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::capture_timing::CaptureTimingCalculator;
use super::engine::{TriggerEngine, TriggerHandler, TriggerInfo, TriggerPayload};
use super::job_queue::{JobQueue, QueueStats};
use super::readiness::{CAMERA_ID_FROM_TIMELAPSE, CaptureReadinessValidator};
use super::time_windows::TimeWindow;
use super::types::{
    DownstreamJobsResult, ImmediateJobResult, JobKind, JobPriority, QueuedJob, SyncReport,
    TimelapseJobResult,
};
use crate::config::SchedulerConfig;
use crate::errors::{AppError, AppResult, SchedulerError, SchedulerResult};
use crate::models::{CaptureCompletedEvent, Timelapse};
use crate::repositories::{CameraRepository, TimelapseRepository};
use crate::utils::jitter::stagger_for_interval;

/// Schedule state of one timelapse's recurring capture job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureJobStatus {
    pub timelapse_id: i64,
    pub scheduled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_fire_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<i64>,
}

/// Snapshot of the whole scheduling subsystem for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub engine_running: bool,
    pub triggers: Vec<TriggerInfo>,
    pub queue: QueueStats,
}

fn capture_job_id(timelapse_id: i64) -> String {
    format!("timelapse_capture_{timelapse_id}")
}

fn timelapse_id_from_job_id(job_id: &str) -> Option<i64> {
    job_id
        .strip_prefix("timelapse_capture_")
        .and_then(|rest| rest.parse::<i64>().ok())
}

fn timelapse_id_from_video_job(job_id: &str) -> Option<i64> {
    job_id
        .strip_prefix("immediate_video_")
        .and_then(|rest| rest.parse::<i64>().ok())
}

/// Owns the trigger engine and job queue; the only component allowed to
/// schedule work
pub struct SchedulerAuthority {
    engine: Arc<TriggerEngine>,
    queue: Arc<JobQueue>,
    validator: CaptureReadinessValidator,
    calculator: CaptureTimingCalculator,
    cameras: Arc<dyn CameraRepository>,
    timelapses: Arc<dyn TimelapseRepository>,
    scheduler_config: SchedulerConfig,
}

impl SchedulerAuthority {
    pub fn new(
        engine: Arc<TriggerEngine>,
        queue: Arc<JobQueue>,
        cameras: Arc<dyn CameraRepository>,
        timelapses: Arc<dyn TimelapseRepository>,
        calculator: CaptureTimingCalculator,
        scheduler_config: SchedulerConfig,
    ) -> Self {
        let validator = CaptureReadinessValidator::new(
            cameras.clone(),
            timelapses.clone(),
            calculator.clone(),
        );
        Self {
            engine,
            queue,
            validator,
            calculator,
            cameras,
            timelapses,
            scheduler_config,
        }
    }

    pub fn engine(&self) -> &Arc<TriggerEngine> {
        &self.engine
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Register a recurring capture job for a timelapse
    pub async fn add_timelapse_job(
        &self,
        timelapse_id: i64,
        interval_seconds: i64,
    ) -> TimelapseJobResult {
        if !self.engine.is_running() {
            return TimelapseJobResult::err(timelapse_id, SchedulerError::Unavailable.to_string());
        }

        let interval_seconds = match self.calculator.validate_capture_interval(interval_seconds) {
            Ok(seconds) => seconds,
            Err(e) => {
                warn!("Rejected capture job for timelapse {}: {}", timelapse_id, e);
                return TimelapseJobResult::err(timelapse_id, e.to_string());
            }
        };
        let interval = Duration::seconds(interval_seconds);

        let first_fire = match self.first_capture_fire(timelapse_id, interval).await {
            Ok(at) => at,
            Err(e) => {
                warn!(
                    "Could not schedule capture job for timelapse {}: {}",
                    timelapse_id, e
                );
                return TimelapseJobResult::err(timelapse_id, e.to_string());
            }
        };

        let job_id = capture_job_id(timelapse_id);
        self.engine
            .add_recurring(
                &job_id,
                TriggerPayload::CaptureTick { timelapse_id },
                interval,
                first_fire,
            )
            .await;

        TimelapseJobResult::ok(
            timelapse_id,
            job_id,
            Some(interval_seconds),
            format!(
                "Capture job scheduled every {}s, first fire {}",
                interval_seconds,
                first_fire.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        )
    }

    /// Reschedule a timelapse's capture job at a new interval
    ///
    /// The replacement happens under the engine's registry lock, so no
    /// tick can fire between the old job disappearing and the new one
    /// existing.
    pub async fn update_timelapse_job(
        &self,
        timelapse_id: i64,
        new_interval_seconds: i64,
    ) -> TimelapseJobResult {
        if !self.engine.is_running() {
            return TimelapseJobResult::err(timelapse_id, SchedulerError::Unavailable.to_string());
        }

        let job_id = capture_job_id(timelapse_id);
        if !self.engine.contains(&job_id).await {
            debug!(
                "Update for timelapse {} found no existing job; scheduling fresh",
                timelapse_id
            );
        }

        let result = self.add_timelapse_job(timelapse_id, new_interval_seconds).await;
        if result.success {
            TimelapseJobResult {
                message: Some(format!(
                    "Capture job rescheduled every {new_interval_seconds}s"
                )),
                ..result
            }
        } else {
            result
        }
    }

    /// Remove a timelapse's capture job and any pending capture for it
    pub async fn remove_timelapse_job(&self, timelapse_id: i64) -> TimelapseJobResult {
        if !self.engine.is_running() {
            return TimelapseJobResult::err(timelapse_id, SchedulerError::Unavailable.to_string());
        }

        let job_id = capture_job_id(timelapse_id);
        let removed = self.engine.remove(&job_id).await;
        let cancelled = self
            .queue
            .cancel_pending(&format!("capture:{timelapse_id}"))
            .await;

        if removed {
            TimelapseJobResult::ok(
                timelapse_id,
                job_id,
                None,
                if cancelled {
                    "Capture job removed and pending capture cancelled"
                } else {
                    "Capture job removed"
                },
            )
        } else {
            TimelapseJobResult::err(
                timelapse_id,
                SchedulerError::UnknownJob { job_id }.to_string(),
            )
        }
    }

    /// Reconcile scheduled capture jobs with the set of running timelapses
    ///
    /// Adds jobs for running timelapses that lack one, removes jobs whose
    /// timelapse is no longer running, and re-registers jobs whose interval
    /// drifted from the stored record. This is the self-healing pass after
    /// a restart; it also runs periodically from [`Self::run_sync_loop`].
    pub async fn sync_running_timelapses(&self) -> SyncReport {
        if !self.engine.is_running() {
            return SyncReport {
                success: false,
                error: Some(SchedulerError::Unavailable.to_string()),
                ..Default::default()
            };
        }

        let running = match self.timelapses.get_running_timelapses().await {
            Ok(running) => running,
            Err(e) => {
                error!("Reconciliation could not list running timelapses: {}", e);
                return SyncReport {
                    success: false,
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let total_running = running.len();
        let mut desired: HashMap<i64, &Timelapse> = running.iter().map(|t| (t.id, t)).collect();

        let mut added = 0usize;
        let mut removed = 0usize;
        let mut updated = 0usize;
        let mut failed = 0usize;

        for info in self.engine.list_triggers().await {
            let Some(timelapse_id) = timelapse_id_from_job_id(&info.job_id) else {
                continue; // one-shot immediates are not reconciled
            };

            match desired.remove(&timelapse_id) {
                None => {
                    self.engine.remove(&info.job_id).await;
                    self.queue
                        .cancel_pending(&format!("capture:{timelapse_id}"))
                        .await;
                    info!(
                        "Removed stale capture job for timelapse {} (no longer running)",
                        timelapse_id
                    );
                    removed += 1;
                }
                Some(timelapse) => {
                    if info.interval_seconds != Some(timelapse.capture_interval_seconds) {
                        match self.register_capture_trigger(timelapse).await {
                            Ok(()) => {
                                info!(
                                    "Repaired drifted interval for timelapse {} ({:?}s -> {}s)",
                                    timelapse_id,
                                    info.interval_seconds,
                                    timelapse.capture_interval_seconds
                                );
                                updated += 1;
                            }
                            Err(e) => {
                                warn!(
                                    "Could not reschedule timelapse {}: {}",
                                    timelapse_id, e
                                );
                                failed += 1;
                            }
                        }
                    }
                }
            }
        }

        for (timelapse_id, timelapse) in desired {
            match self.register_capture_trigger(timelapse).await {
                Ok(()) => added += 1,
                Err(e) => {
                    warn!("Could not schedule timelapse {}: {}", timelapse_id, e);
                    failed += 1;
                }
            }
        }

        info!(
            "Reconciliation: {} added, {} removed, {} updated, {} failed ({} running timelapses)",
            added, removed, updated, failed, total_running
        );

        SyncReport {
            success: true,
            added,
            removed,
            updated,
            failed,
            total_running,
            error: None,
        }
    }

    /// Schedule a one-off capture; it still passes the readiness gate when
    /// its trigger fires
    pub async fn schedule_immediate_capture(
        &self,
        camera_id: i64,
        timelapse_id: i64,
        priority: JobPriority,
    ) -> ImmediateJobResult {
        if !self.engine.is_running() {
            return ImmediateJobResult::err("capture", SchedulerError::Unavailable.to_string())
                .with_camera(camera_id)
                .with_timelapse(timelapse_id);
        }

        let job_id = format!("immediate_capture_{timelapse_id}");
        self.engine
            .add_one_shot(
                &job_id,
                TriggerPayload::Immediate {
                    kind: JobKind::Capture {
                        camera_id,
                        timelapse_id,
                    },
                    priority,
                },
                Utc::now(),
            )
            .await;

        ImmediateJobResult::ok("capture", job_id, "Immediate capture scheduled")
            .with_camera(camera_id)
            .with_timelapse(timelapse_id)
    }

    /// Schedule a one-off video generation for a timelapse
    pub async fn schedule_immediate_video_generation(
        &self,
        timelapse_id: i64,
        settings: Option<serde_json::Value>,
        priority: JobPriority,
    ) -> ImmediateJobResult {
        if !self.engine.is_running() {
            return ImmediateJobResult::err(
                "video_generation",
                SchedulerError::Unavailable.to_string(),
            )
            .with_timelapse(timelapse_id);
        }

        let job_id = format!("immediate_video_{timelapse_id}");
        self.engine
            .add_one_shot(
                &job_id,
                TriggerPayload::Immediate {
                    kind: JobKind::VideoGeneration {
                        timelapse_id,
                        settings,
                    },
                    priority,
                },
                Utc::now(),
            )
            .await;

        ImmediateJobResult::ok("video_generation", job_id, "Video generation scheduled")
            .with_timelapse(timelapse_id)
    }

    /// Schedule a one-off overlay render for a stored image
    pub async fn schedule_immediate_overlay_generation(
        &self,
        image_id: i64,
        priority: JobPriority,
    ) -> ImmediateJobResult {
        if !self.engine.is_running() {
            return ImmediateJobResult::err(
                "overlay_generation",
                SchedulerError::Unavailable.to_string(),
            )
            .with_image(image_id);
        }

        let job_id = format!("immediate_overlay_{image_id}");
        self.engine
            .add_one_shot(
                &job_id,
                TriggerPayload::Immediate {
                    kind: JobKind::OverlayGeneration { image_id },
                    priority,
                },
                Utc::now(),
            )
            .await;

        ImmediateJobResult::ok("overlay_generation", job_id, "Overlay generation scheduled")
            .with_image(image_id)
    }

    /// Schedule a one-off thumbnail render for a stored image
    pub async fn schedule_immediate_thumbnail_generation(
        &self,
        image_id: i64,
        priority: JobPriority,
    ) -> ImmediateJobResult {
        if !self.engine.is_running() {
            return ImmediateJobResult::err(
                "thumbnail_generation",
                SchedulerError::Unavailable.to_string(),
            )
            .with_image(image_id);
        }

        let job_id = format!("immediate_thumbnail_{image_id}");
        self.engine
            .add_one_shot(
                &job_id,
                TriggerPayload::Immediate {
                    kind: JobKind::ThumbnailGeneration { image_id },
                    priority,
                },
                Utc::now(),
            )
            .await;

        ImmediateJobResult::ok(
            "thumbnail_generation",
            job_id,
            "Thumbnail generation scheduled",
        )
        .with_image(image_id)
    }

    /// Cancel scheduled video work and notify the video worker
    ///
    /// Removes the target trigger and any pending video job. Work a worker
    /// already started is not preempted here; the queued cancellation job
    /// tells the worker to stop on its own schedule.
    pub async fn schedule_immediate_video_cancellation(
        &self,
        video_id: i64,
        target_job_id: &str,
        priority: JobPriority,
    ) -> ImmediateJobResult {
        if !self.engine.is_running() {
            return ImmediateJobResult::err(
                "video_cancellation",
                SchedulerError::Unavailable.to_string(),
            )
            .with_video(video_id);
        }

        let removed_trigger = self.engine.remove(target_job_id).await;
        let cancelled_pending = match timelapse_id_from_video_job(target_job_id) {
            Some(timelapse_id) => {
                self.queue
                    .cancel_pending(&format!("video:{timelapse_id}"))
                    .await
            }
            None => false,
        };

        let notice = QueuedJob::new(
            JobKind::VideoCancellation {
                video_id,
                target_job_id: target_job_id.to_string(),
            },
            priority,
        );
        let enqueued = match self.queue.enqueue(notice).await {
            Ok(enqueued) => enqueued,
            Err(e) => {
                return ImmediateJobResult::err("video_cancellation", e.to_string())
                    .with_video(video_id);
            }
        };

        let message = match (removed_trigger, cancelled_pending, enqueued) {
            (true, true, _) => "Removed scheduled trigger and cancelled pending video job",
            (true, false, _) => "Removed scheduled trigger",
            (false, true, _) => "Cancelled pending video job",
            (false, false, true) => "No scheduled work found; cancellation forwarded to workers",
            (false, false, false) => "Cancellation already pending",
        };

        info!(
            "Video cancellation for video {} (target {}): {}",
            video_id, target_job_id, message
        );

        ImmediateJobResult::ok("video_cancellation", target_job_id.to_string(), message)
            .with_video(video_id)
    }

    /// React to a completed capture by queueing downstream processing
    pub async fn handle_capture_completed(
        &self,
        event: &CaptureCompletedEvent,
    ) -> DownstreamJobsResult {
        let mut thumbnail_job_id = None;
        let mut overlay_job_id = None;
        let mut errors = Vec::new();

        if event.generate_thumbnail {
            let job = QueuedJob::new(
                JobKind::ThumbnailGeneration {
                    image_id: event.image_id,
                },
                JobPriority::Low,
            );
            let id = job.id;
            match self.queue.enqueue(job).await {
                Ok(true) => thumbnail_job_id = Some(id),
                Ok(false) => debug!("Thumbnail for image {} already queued", event.image_id),
                Err(e) => errors.push(e.to_string()),
            }
        }

        if event.generate_overlay {
            let job = QueuedJob::new(
                JobKind::OverlayGeneration {
                    image_id: event.image_id,
                },
                JobPriority::Low,
            );
            let id = job.id;
            match self.queue.enqueue(job).await {
                Ok(true) => overlay_job_id = Some(id),
                Ok(false) => debug!("Overlay for image {} already queued", event.image_id),
                Err(e) => errors.push(e.to_string()),
            }
        }

        let queued = usize::from(thumbnail_job_id.is_some()) + usize::from(overlay_job_id.is_some());
        if errors.is_empty() {
            DownstreamJobsResult {
                success: true,
                image_id: event.image_id,
                thumbnail_job_id,
                overlay_job_id,
                message: Some(format!(
                    "Queued {} downstream job(s) for image {}",
                    queued, event.image_id
                )),
                error: None,
            }
        } else {
            DownstreamJobsResult {
                success: false,
                image_id: event.image_id,
                thumbnail_job_id,
                overlay_job_id,
                message: None,
                error: Some(errors.join("; ")),
            }
        }
    }

    /// Schedule state of one timelapse's capture job
    ///
    /// Errors with [`SchedulerError::Unavailable`] while the engine is not
    /// running; callers should degrade to "no schedule info" rather than
    /// failing their own request.
    pub async fn capture_status_for_timelapse(
        &self,
        timelapse_id: i64,
    ) -> SchedulerResult<CaptureJobStatus> {
        if !self.engine.is_running() {
            return Err(SchedulerError::Unavailable);
        }

        let info = self.engine.trigger_info(&capture_job_id(timelapse_id)).await;
        Ok(CaptureJobStatus {
            timelapse_id,
            scheduled: info.is_some(),
            job_id: info.as_ref().map(|i| i.job_id.clone()),
            next_fire_at: info.as_ref().map(|i| i.next_fire_at),
            interval_seconds: info.as_ref().and_then(|i| i.interval_seconds),
        })
    }

    /// Full subsystem snapshot for a health endpoint
    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            engine_running: self.engine.is_running(),
            triggers: self.engine.list_triggers().await,
            queue: self.queue.stats().await,
        }
    }

    /// Run the periodic reconciliation loop until cancelled
    ///
    /// The first tick is skipped; startup runs one explicit sync before
    /// spawning this loop.
    pub async fn run_sync_loop(&self, cancellation_token: CancellationToken) {
        info!(
            "Starting reconciliation loop (every {:?})",
            self.scheduler_config.sync_interval
        );
        let mut sync_tick = interval(self.scheduler_config.sync_interval);
        sync_tick.tick().await;

        loop {
            tokio::select! {
                _ = sync_tick.tick() => {
                    let report = self.sync_running_timelapses().await;
                    if !report.success {
                        error!(
                            "Reconciliation pass failed: {}",
                            report.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
                _ = cancellation_token.cancelled() => {
                    info!("Reconciliation loop received cancellation signal, shutting down");
                    break;
                }
            }
        }

        info!("Reconciliation loop stopped");
    }

    /// Validate and (re)register the recurring capture trigger for a record
    async fn register_capture_trigger(&self, timelapse: &Timelapse) -> AppResult<()> {
        let interval_seconds = self
            .calculator
            .validate_capture_interval(timelapse.capture_interval_seconds)?;
        let interval = Duration::seconds(interval_seconds);
        let first_fire = self.first_capture_fire_from(timelapse, interval).await?;

        self.engine
            .add_recurring(
                &capture_job_id(timelapse.id),
                TriggerPayload::CaptureTick {
                    timelapse_id: timelapse.id,
                },
                interval,
                first_fire,
            )
            .await;
        Ok(())
    }

    async fn first_capture_fire(
        &self,
        timelapse_id: i64,
        interval: Duration,
    ) -> AppResult<DateTime<Utc>> {
        let timelapse = self
            .timelapses
            .get_timelapse_by_id(timelapse_id)
            .await?
            .ok_or_else(|| AppError::not_found("timelapse", timelapse_id))?;
        self.first_capture_fire_from(&timelapse, interval).await
    }

    /// When the recurring trigger should first fire for this record
    ///
    /// An already-overdue next capture collapses to "now plus a small
    /// stagger" (one immediate evaluation, never a backlog burst) when
    /// `run_missed_immediately` is set, else to one full interval out.
    async fn first_capture_fire_from(
        &self,
        timelapse: &Timelapse,
        interval: Duration,
    ) -> AppResult<DateTime<Utc>> {
        let now = Utc::now();
        let window = TimeWindow::from_optional_strings(
            timelapse.time_window_start.as_deref(),
            timelapse.time_window_end.as_deref(),
        )?;
        let last_capture = self
            .cameras
            .get_camera_by_id(timelapse.camera_id)
            .await?
            .and_then(|camera| camera.last_capture_at);

        let computed = self.calculator.calculate_next_capture_for_camera(
            last_capture,
            interval,
            window.as_ref(),
            now,
        );

        Ok(if computed <= now {
            if self.scheduler_config.run_missed_immediately {
                now + stagger_for_interval(interval, self.scheduler_config.startup_jitter_percent)
            } else {
                now + interval
            }
        } else {
            computed
        })
    }

    /// Run the readiness gate and, on a positive verdict, queue the capture
    async fn dispatch_capture(
        &self,
        camera_id: i64,
        timelapse_id: i64,
        priority: JobPriority,
    ) -> AppResult<()> {
        let readiness = self.validator.evaluate(camera_id, timelapse_id).await;
        if !readiness.valid {
            // The validator already logged the reason at low severity
            return Ok(());
        }
        let Some(camera) = readiness.camera else {
            return Ok(());
        };

        let job = QueuedJob::new(
            JobKind::Capture {
                camera_id: camera.id,
                timelapse_id,
            },
            priority,
        );
        if self.queue.enqueue(job).await? {
            info!(
                "Dispatched capture job for timelapse {} (camera {})",
                timelapse_id, camera.id
            );
        } else {
            debug!("Capture for timelapse {} already in flight", timelapse_id);
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerHandler for SchedulerAuthority {
    async fn on_trigger(&self, job_id: &str, payload: &TriggerPayload) -> AppResult<()> {
        match payload {
            TriggerPayload::CaptureTick { timelapse_id } => {
                self.dispatch_capture(CAMERA_ID_FROM_TIMELAPSE, *timelapse_id, JobPriority::Normal)
                    .await
            }
            TriggerPayload::Immediate { kind, priority } => match kind {
                JobKind::Capture {
                    camera_id,
                    timelapse_id,
                } => self.dispatch_capture(*camera_id, *timelapse_id, *priority).await,
                other => {
                    let job = QueuedJob::new(other.clone(), *priority);
                    if self.queue.enqueue(job).await? {
                        debug!(
                            "Dispatched {} job from trigger {}",
                            other.kind_name(),
                            job_id
                        );
                    } else {
                        debug!(
                            "{} job from trigger {} already queued",
                            other.kind_name(),
                            job_id
                        );
                    }
                    Ok(())
                }
            },
        }
    }
}
