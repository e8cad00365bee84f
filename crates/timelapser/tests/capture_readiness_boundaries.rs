//! Readiness verdicts at exact clock boundaries
//!
//! The validator composes camera state, timelapse state, window membership,
//! and interval arithmetic. These tests pin its verdicts at specific
//! instants so boundary behavior cannot drift: the first due capture after
//! a window opens, the grace-period flip, and overnight membership.

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use timelapser::models::{Camera, CameraHealth, CameraStatus, Timelapse, TimelapseStatus};
use timelapser::repositories::memory::{InMemoryCameraRepository, InMemoryTimelapseRepository};
use timelapser::scheduling::{
    CaptureReadinessValidator, CaptureTimingCalculator, ReadinessErrorKind, TimingSettings,
};

fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap()
}

fn settings(grace_seconds: i64) -> TimingSettings {
    TimingSettings {
        min_interval: Duration::seconds(5),
        max_interval: Duration::hours(24),
        grace_period: Duration::seconds(grace_seconds),
        timezone: Tz::UTC,
    }
}

async fn validator_for(
    camera: Camera,
    timelapse: Timelapse,
    settings: TimingSettings,
) -> CaptureReadinessValidator {
    let cameras = Arc::new(InMemoryCameraRepository::new());
    let timelapses = Arc::new(InMemoryTimelapseRepository::new());
    cameras.upsert(camera).await;
    timelapses.upsert(timelapse).await;
    CaptureReadinessValidator::new(cameras, timelapses, CaptureTimingCalculator::new(settings))
}

fn camera_with_last_capture(last_capture_at: Option<DateTime<Utc>>) -> Camera {
    Camera {
        id: 1,
        name: "ridge-cam".to_string(),
        status: CameraStatus::Active,
        health_status: CameraHealth::Online,
        last_capture_at,
    }
}

fn windowed_timelapse(
    interval_seconds: i64,
    window: Option<(&str, &str)>,
) -> Timelapse {
    Timelapse {
        id: 10,
        camera_id: 1,
        name: "site".to_string(),
        status: TimelapseStatus::Running,
        capture_interval_seconds: interval_seconds,
        time_window_start: window.map(|(s, _)| s.to_string()),
        time_window_end: window.map(|(_, e)| e.to_string()),
        created_at: utc(0, 0, 0),
    }
}

#[tokio::test]
async fn test_window_opening_boundary_sequence() {
    // Last capture 05:59:00, interval 300s, window 06:00-20:00, no grace.
    // The capture becomes due at exactly 06:04:00, not when the window opens.
    let validator = validator_for(
        camera_with_last_capture(Some(utc(5, 59, 0))),
        windowed_timelapse(300, Some(("06:00", "20:00"))),
        settings(0),
    )
    .await;

    let before_open = validator.evaluate_at(1, 10, utc(5, 59, 30)).await;
    assert!(!before_open.valid);
    assert_eq!(
        before_open.error_type,
        Some(ReadinessErrorKind::OutsideTimeWindow)
    );

    let just_opened = validator.evaluate_at(1, 10, utc(6, 0, 30)).await;
    assert!(!just_opened.valid);
    assert_eq!(just_opened.error_type, Some(ReadinessErrorKind::CaptureNotDue));
    assert_eq!(just_opened.next_capture_time, Some(utc(6, 4, 0)));

    let one_second_early = validator.evaluate_at(1, 10, utc(6, 3, 59)).await;
    assert!(!one_second_early.valid);
    assert_eq!(
        one_second_early.error_type,
        Some(ReadinessErrorKind::CaptureNotDue)
    );

    let on_the_boundary = validator.evaluate_at(1, 10, utc(6, 4, 0)).await;
    assert!(on_the_boundary.valid, "{:?}", on_the_boundary.error);
}

#[tokio::test]
async fn test_grace_period_shifts_due_boundary() {
    // Interval 60s with 5s grace: due flips at T+55, not T+60
    let validator = validator_for(
        camera_with_last_capture(Some(utc(12, 0, 0))),
        windowed_timelapse(60, None),
        settings(5),
    )
    .await;

    let early = validator.evaluate_at(1, 10, utc(12, 0, 54)).await;
    assert!(!early.valid);
    assert_eq!(early.error_type, Some(ReadinessErrorKind::CaptureNotDue));

    let within_grace = validator.evaluate_at(1, 10, utc(12, 0, 55)).await;
    assert!(within_grace.valid, "{:?}", within_grace.error);
}

#[tokio::test]
async fn test_overnight_window_membership() {
    let validator = validator_for(
        camera_with_last_capture(None),
        windowed_timelapse(300, Some(("22:00", "02:00"))),
        settings(0),
    )
    .await;

    // Evening segment: first capture, inside the window
    let evening = validator.evaluate_at(1, 10, utc(23, 50, 0)).await;
    assert!(evening.valid, "{:?}", evening.error);

    // Morning tail of the window that started yesterday
    let morning = validator.evaluate_at(1, 10, utc(1, 30, 0)).await;
    assert!(morning.valid, "{:?}", morning.error);

    // Midday gap: blocked, pointing at tonight's opening
    let midday = validator.evaluate_at(1, 10, utc(12, 0, 0)).await;
    assert!(!midday.valid);
    assert_eq!(
        midday.error_type,
        Some(ReadinessErrorKind::OutsideTimeWindow)
    );
    assert_eq!(midday.next_capture_time, Some(utc(22, 0, 0)));
}

#[tokio::test]
async fn test_blocked_verdicts_keep_context_for_callers() {
    // An HTTP layer needs the camera, timelapse, and next capture time to
    // render a useful "why not" answer without extra lookups.
    let validator = validator_for(
        camera_with_last_capture(Some(utc(12, 0, 0))),
        windowed_timelapse(300, None),
        settings(0),
    )
    .await;

    let blocked = validator.evaluate_at(1, 10, utc(12, 1, 0)).await;
    assert!(!blocked.valid);
    assert_eq!(blocked.camera.as_ref().map(|c| c.id), Some(1));
    assert_eq!(blocked.timelapse.as_ref().map(|t| t.id), Some(10));
    assert_eq!(blocked.next_capture_time, Some(utc(12, 5, 0)));
    let message = blocked.error.unwrap();
    assert!(message.contains("60s since last capture"), "{message}");
    assert!(message.contains("interval 300s"), "{message}");
}
