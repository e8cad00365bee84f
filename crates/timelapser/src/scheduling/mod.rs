//! Capture scheduling subsystem for timelapser
//!
//! This module provides the scheduling core that decides when captures
//! and processing jobs happen:
//! - Recurring capture scheduling per timelapse
//! - Immediate (one-off) capture, video, overlay, and thumbnail jobs
//! - Capture readiness validation before any capture is queued
//! - Reconciliation between stored timelapse records and live schedule
//!
//! The system is built around four main components:
//! - `CaptureTimingCalculator`: pure due-time and window arithmetic
//! - `TriggerEngine`: wall-clock trigger loop that fires registered jobs
//! - `JobQueue`: thread-safe priority queue with deduplication
//! - `SchedulerAuthority`: the single component allowed to schedule work

pub mod authority;
pub mod capture_timing;
pub mod engine;
pub mod job_queue;
pub mod readiness;
pub mod time_windows;
pub mod types;

pub use authority::{CaptureJobStatus, SchedulerAuthority, SchedulerStatus};
pub use capture_timing::{CaptureDueVerdict, CaptureTimingCalculator, DueReason, TimingSettings};
pub use engine::{TriggerEngine, TriggerHandler, TriggerInfo, TriggerPayload};
pub use job_queue::{JobQueue, QueueStats};
pub use readiness::{CaptureReadiness, CaptureReadinessValidator, ReadinessErrorKind};
pub use time_windows::TimeWindow;
pub use types::*;
