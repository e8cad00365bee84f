//! Interval trigger engine
//!
//! Owns the registry of live triggers (recurring capture ticks plus one-shot
//! immediates) and a single dispatch loop that sleeps until the earliest
//! next-fire time, clamped between the configured tick bounds. Registry
//! changes nudge the loop awake so a freshly added trigger is never stuck
//! behind a long sleep.
//!
//! The engine knows nothing about cameras or queues; it hands fired
//! payloads to a [`TriggerHandler`] and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::types::{JobKind, JobPriority};
use crate::config::SchedulerConfig;
use crate::errors::{AppError, AppResult};

/// What a trigger carries to the handler when it fires
#[derive(Debug, Clone)]
pub enum TriggerPayload {
    /// Recurring capture evaluation tick for a timelapse
    CaptureTick { timelapse_id: i64 },
    /// One-shot dispatch of a prepared job at the priority chosen when it
    /// was scheduled
    Immediate { kind: JobKind, priority: JobPriority },
}

impl TriggerPayload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TriggerPayload::CaptureTick { .. } => "capture",
            TriggerPayload::Immediate { kind, .. } => kind.kind_name(),
        }
    }
}

/// Receives fired triggers; implemented by the scheduler authority
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn on_trigger(&self, job_id: &str, payload: &TriggerPayload) -> AppResult<()>;
}

/// Public view of one registered trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub job_id: String,
    pub kind: String,
    pub next_fire_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<i64>,
}

struct RegisteredTrigger {
    payload: TriggerPayload,
    /// None means one-shot: the trigger deregisters itself after firing
    interval: Option<chrono::Duration>,
    next_fire_at: DateTime<Utc>,
}

/// The single dispatch loop all scheduled work flows through
pub struct TriggerEngine {
    triggers: Arc<RwLock<HashMap<String, RegisteredTrigger>>>,
    wake_tx: mpsc::UnboundedSender<()>,
    wake_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    running: AtomicBool,
    tick_floor: std::time::Duration,
    tick_ceiling: std::time::Duration,
}

impl TriggerEngine {
    pub fn new(config: &SchedulerConfig) -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        Self {
            triggers: Arc::new(RwLock::new(HashMap::new())),
            wake_tx,
            wake_rx: Mutex::new(Some(wake_rx)),
            running: AtomicBool::new(false),
            tick_floor: config.tick_bounds_min,
            tick_ceiling: config.tick_bounds_max,
        }
    }

    /// Register a trigger that fires every `interval`, first at `first_fire_at`
    ///
    /// Re-registering an existing job id replaces it; reconciliation relies
    /// on registration being idempotent.
    pub async fn add_recurring(
        &self,
        job_id: &str,
        payload: TriggerPayload,
        interval: chrono::Duration,
        first_fire_at: DateTime<Utc>,
    ) {
        let mut triggers = self.triggers.write().await;
        let replaced = triggers
            .insert(
                job_id.to_string(),
                RegisteredTrigger {
                    payload,
                    interval: Some(interval),
                    next_fire_at: first_fire_at,
                },
            )
            .is_some();
        drop(triggers);

        if replaced {
            debug!("Replaced existing trigger {}", job_id);
        }
        info!(
            "Registered recurring trigger {} (every {}s, first fire {})",
            job_id,
            interval.num_seconds(),
            first_fire_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = self.wake_tx.send(());
    }

    /// Register a trigger that fires once at `fire_at` and then deregisters
    pub async fn add_one_shot(&self, job_id: &str, payload: TriggerPayload, fire_at: DateTime<Utc>) {
        let mut triggers = self.triggers.write().await;
        triggers.insert(
            job_id.to_string(),
            RegisteredTrigger {
                payload,
                interval: None,
                next_fire_at: fire_at,
            },
        );
        drop(triggers);

        debug!(
            "Registered one-shot trigger {} firing at {}",
            job_id,
            fire_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = self.wake_tx.send(());
    }

    /// Remove a trigger; returns whether one existed
    pub async fn remove(&self, job_id: &str) -> bool {
        let removed = self.triggers.write().await.remove(job_id).is_some();
        if removed {
            info!("Removed trigger {}", job_id);
            let _ = self.wake_tx.send(());
        }
        removed
    }

    pub async fn contains(&self, job_id: &str) -> bool {
        self.triggers.read().await.contains_key(job_id)
    }

    /// Snapshot of one trigger, if registered
    pub async fn trigger_info(&self, job_id: &str) -> Option<TriggerInfo> {
        let triggers = self.triggers.read().await;
        triggers.get(job_id).map(|t| TriggerInfo {
            job_id: job_id.to_string(),
            kind: t.payload.kind_name().to_string(),
            next_fire_at: t.next_fire_at,
            interval_seconds: t.interval.map(|i| i.num_seconds()),
        })
    }

    /// Snapshot of every registered trigger, earliest fire first
    pub async fn list_triggers(&self) -> Vec<TriggerInfo> {
        let triggers = self.triggers.read().await;
        let mut infos: Vec<TriggerInfo> = triggers
            .iter()
            .map(|(job_id, t)| TriggerInfo {
                job_id: job_id.clone(),
                kind: t.payload.kind_name().to_string(),
                next_fire_at: t.next_fire_at,
                interval_seconds: t.interval.map(|i| i.num_seconds()),
            })
            .collect();
        infos.sort_by(|a, b| a.next_fire_at.cmp(&b.next_fire_at));
        infos
    }

    /// Whether the dispatch loop is live
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the dispatch loop until cancelled
    pub async fn run(
        &self,
        handler: Arc<dyn TriggerHandler>,
        cancellation_token: CancellationToken,
    ) -> AppResult<()> {
        let mut wake_rx = self
            .wake_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| AppError::internal("trigger engine is already running"))?;

        self.running.store(true, Ordering::SeqCst);
        info!("Starting trigger engine");

        loop {
            let next_wake = self.calculate_next_wake().await;
            trace!("Next trigger engine wake: {:?}", next_wake);

            tokio::select! {
                _ = sleep_until(next_wake) => {
                    self.fire_due_triggers(&handler).await;
                }
                Some(()) = wake_rx.recv() => {
                    trace!("Trigger registry changed, recomputing wake time");
                }
                _ = cancellation_token.cancelled() => {
                    info!("Trigger engine received cancellation signal, shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        *self.wake_rx.lock().await = Some(wake_rx);
        info!("Trigger engine stopped");
        Ok(())
    }

    /// Earliest next-fire time, clamped between the tick bounds
    async fn calculate_next_wake(&self) -> Instant {
        let now = Utc::now();
        let triggers = self.triggers.read().await;
        let next_fire = triggers.values().map(|t| t.next_fire_at).min();
        drop(triggers);

        let ceiling_chrono = chrono::Duration::from_std(self.tick_ceiling)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let target = next_fire.unwrap_or(now + ceiling_chrono);

        let sleep_duration = target
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
            .max(self.tick_floor)
            .min(self.tick_ceiling);

        Instant::now() + sleep_duration
    }

    /// Fire everything due, advancing recurring triggers and dropping one-shots
    async fn fire_due_triggers(&self, handler: &Arc<dyn TriggerHandler>) {
        let now = Utc::now();
        let mut due = Vec::new();

        {
            let mut triggers = self.triggers.write().await;
            let mut finished = Vec::new();

            for (job_id, trigger) in triggers.iter_mut() {
                if trigger.next_fire_at > now {
                    continue;
                }
                due.push((job_id.clone(), trigger.payload.clone()));
                match trigger.interval {
                    Some(interval) => trigger.next_fire_at = now + interval,
                    None => finished.push(job_id.clone()),
                }
            }

            for job_id in &finished {
                triggers.remove(job_id);
                debug!("One-shot trigger {} fired and deregistered", job_id);
            }
        }

        // Dispatches are spawned outside the registry lock: handlers may
        // re-register or remove triggers, and a slow handler must not hold
        // back the rest of the batch or the loop itself.
        for (job_id, payload) in due {
            trace!("Firing trigger {}", job_id);
            let handler = Arc::clone(handler);
            tokio::spawn(async move {
                if let Err(e) = handler.on_trigger(&job_id, &payload).await {
                    error!("Error processing trigger {}: {}", job_id, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            tick_bounds_min: std::time::Duration::from_millis(5),
            tick_bounds_max: std::time::Duration::from_millis(50),
            ..SchedulerConfig::default()
        }
    }

    struct RecordingHandler {
        fired: Arc<RwLock<Vec<String>>>,
        count: Arc<AtomicUsize>,
    }

    impl RecordingHandler {
        fn new() -> (Self, Arc<RwLock<Vec<String>>>, Arc<AtomicUsize>) {
            let fired = Arc::new(RwLock::new(Vec::new()));
            let count = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    fired: fired.clone(),
                    count: count.clone(),
                },
                fired,
                count,
            )
        }
    }

    #[async_trait]
    impl TriggerHandler for RecordingHandler {
        async fn on_trigger(&self, job_id: &str, _payload: &TriggerPayload) -> AppResult<()> {
            self.fired.write().await.push(job_id.to_string());
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Every dispatch waits at the barrier, so a batch only completes when
    /// its dispatches overlap in time
    struct RendezvousHandler {
        barrier: Arc<tokio::sync::Barrier>,
        completed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TriggerHandler for RendezvousHandler {
        async fn on_trigger(&self, _job_id: &str, _payload: &TriggerPayload) -> AppResult<()> {
            self.barrier.wait().await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_registry_bookkeeping() {
        let engine = TriggerEngine::new(&SchedulerConfig::default());
        let now = Utc::now();

        engine
            .add_recurring(
                "timelapse_capture_7",
                TriggerPayload::CaptureTick { timelapse_id: 7 },
                chrono::Duration::seconds(300),
                now + chrono::Duration::seconds(300),
            )
            .await;

        assert!(engine.contains("timelapse_capture_7").await);
        let info = engine.trigger_info("timelapse_capture_7").await.unwrap();
        assert_eq!(info.kind, "capture");
        assert_eq!(info.interval_seconds, Some(300));

        assert!(engine.remove("timelapse_capture_7").await);
        assert!(!engine.remove("timelapse_capture_7").await);
        assert!(engine.trigger_info("timelapse_capture_7").await.is_none());
    }

    #[tokio::test]
    async fn test_list_triggers_sorted_by_next_fire() {
        let engine = TriggerEngine::new(&SchedulerConfig::default());
        let now = Utc::now();

        engine
            .add_recurring(
                "timelapse_capture_1",
                TriggerPayload::CaptureTick { timelapse_id: 1 },
                chrono::Duration::seconds(600),
                now + chrono::Duration::seconds(600),
            )
            .await;
        engine
            .add_recurring(
                "timelapse_capture_2",
                TriggerPayload::CaptureTick { timelapse_id: 2 },
                chrono::Duration::seconds(60),
                now + chrono::Duration::seconds(60),
            )
            .await;

        let infos = engine.list_triggers().await;
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].job_id, "timelapse_capture_2");
        assert_eq!(infos[1].job_id, "timelapse_capture_1");
    }

    #[tokio::test]
    async fn test_recurring_trigger_fires_repeatedly() {
        let engine = Arc::new(TriggerEngine::new(&fast_config()));
        let (handler, _fired, count) = RecordingHandler::new();
        let handler: Arc<dyn TriggerHandler> = Arc::new(handler);
        let token = CancellationToken::new();

        engine
            .add_recurring(
                "timelapse_capture_1",
                TriggerPayload::CaptureTick { timelapse_id: 1 },
                chrono::Duration::milliseconds(20),
                Utc::now(),
            )
            .await;

        let run_engine = engine.clone();
        let run_token = token.clone();
        let run_handle =
            tokio::spawn(async move { run_engine.run(handler, run_token).await });

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(engine.is_running());
        token.cancel();
        run_handle.await.unwrap().unwrap();

        assert!(!engine.is_running());
        assert!(count.load(Ordering::SeqCst) >= 2);
        // Recurring trigger survives its fires
        assert!(engine.contains("timelapse_capture_1").await);
    }

    #[tokio::test]
    async fn test_one_shot_fires_once_and_deregisters() {
        let engine = Arc::new(TriggerEngine::new(&fast_config()));
        let (handler, fired, count) = RecordingHandler::new();
        let handler: Arc<dyn TriggerHandler> = Arc::new(handler);
        let token = CancellationToken::new();

        let run_engine = engine.clone();
        let run_token = token.clone();
        let run_handle =
            tokio::spawn(async move { run_engine.run(handler, run_token).await });

        // Added while the loop is asleep; the nudge must wake it
        engine
            .add_one_shot(
                "immediate_thumbnail_42",
                TriggerPayload::Immediate {
                    kind: JobKind::ThumbnailGeneration { image_id: 42 },
                    priority: JobPriority::Low,
                },
                Utc::now(),
            )
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        token.cancel();
        run_handle.await.unwrap().unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(fired.read().await.as_slice(), ["immediate_thumbnail_42"]);
        assert!(!engine.contains("immediate_thumbnail_42").await);
    }

    #[tokio::test]
    async fn test_due_batch_handlers_run_concurrently() {
        let engine = Arc::new(TriggerEngine::new(&fast_config()));
        let completed = Arc::new(AtomicUsize::new(0));
        let handler: Arc<dyn TriggerHandler> = Arc::new(RendezvousHandler {
            barrier: Arc::new(tokio::sync::Barrier::new(2)),
            completed: completed.clone(),
        });
        let token = CancellationToken::new();

        // Both one-shots are already due when the loop starts, so they fire
        // in the same batch
        let now = Utc::now();
        engine
            .add_one_shot(
                "immediate_thumbnail_1",
                TriggerPayload::Immediate {
                    kind: JobKind::ThumbnailGeneration { image_id: 1 },
                    priority: JobPriority::Low,
                },
                now,
            )
            .await;
        engine
            .add_one_shot(
                "immediate_thumbnail_2",
                TriggerPayload::Immediate {
                    kind: JobKind::ThumbnailGeneration { image_id: 2 },
                    priority: JobPriority::Low,
                },
                now,
            )
            .await;

        let run_engine = engine.clone();
        let run_token = token.clone();
        let run_handle =
            tokio::spawn(async move { run_engine.run(handler, run_token).await });

        let mut converged = false;
        for _ in 0..200 {
            if completed.load(Ordering::SeqCst) == 2 {
                converged = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(converged, "a slow dispatch stalled the rest of the batch");

        token.cancel();
        run_handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let engine = Arc::new(TriggerEngine::new(&fast_config()));
        let token = CancellationToken::new();

        let (handler, _, _) = RecordingHandler::new();
        let handler: Arc<dyn TriggerHandler> = Arc::new(handler);

        let run_engine = engine.clone();
        let run_token = token.clone();
        let first_handler = handler.clone();
        let run_handle =
            tokio::spawn(async move { run_engine.run(first_handler, run_token).await });

        // Give the first loop time to claim the receiver
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = engine.run(handler, token.clone()).await;
        assert!(second.is_err());

        token.cancel();
        run_handle.await.unwrap().unwrap();
    }
}
