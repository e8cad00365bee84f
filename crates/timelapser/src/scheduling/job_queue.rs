//! Job queue implementation with deduplication and priority ordering
//!
//! Downstream workers (capture, video, overlay, thumbnail) poll this queue;
//! the scheduler is the only producer. A job key is tracked from enqueue
//! until `mark_completed`, so a timelapse can never have two capture jobs
//! in flight at once.

use super::types::QueuedJob;
use crate::errors::SchedulerError;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Thread-safe job queue with deduplication and priority ordering
///
/// Lock order is `job_keys` before `pending`; no method holds a guard on
/// one map while acquiring another in any other order.
#[derive(Debug)]
pub struct JobQueue {
    /// Pending jobs ordered by priority and time (min-heap using Reverse)
    pending: Arc<RwLock<BinaryHeap<Reverse<QueuedJob>>>>,
    /// Currently running jobs (job_id -> job_key mapping)
    running: Arc<RwLock<HashMap<Uuid, String>>>,
    /// Active job keys for deduplication (both pending and running)
    job_keys: Arc<RwLock<HashSet<String>>>,
    /// Maximum number of pending jobs before enqueue is refused
    max_pending: usize,
}

impl JobQueue {
    /// Create a new empty job queue
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Arc::new(RwLock::new(BinaryHeap::new())),
            running: Arc::new(RwLock::new(HashMap::new())),
            job_keys: Arc::new(RwLock::new(HashSet::new())),
            max_pending,
        }
    }

    /// Enqueue a job if it doesn't already exist
    /// Returns Ok(true) if job was enqueued, Ok(false) if duplicate was skipped
    pub async fn enqueue(&self, job: QueuedJob) -> Result<bool, SchedulerError> {
        let job_key = job.job_key();
        let mut job_keys = self.job_keys.write().await;

        // Check for duplicate job
        if job_keys.contains(&job_key) {
            debug!("Skipping duplicate job for key: {}", job_key);
            return Ok(false);
        }

        let mut pending = self.pending.write().await;
        if pending.len() >= self.max_pending {
            warn!(
                "Job queue full ({} pending), refusing job {}",
                pending.len(),
                job_key
            );
            return Err(SchedulerError::QueueFull {
                pending: pending.len(),
            });
        }

        job_keys.insert(job_key.clone());
        pending.push(Reverse(job.clone()));

        info!(
            "Enqueued job {} (kind: {}, priority: {:?}, eligible: {})",
            job_key,
            job.kind.kind_name(),
            job.priority,
            job.scheduled_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(true)
    }

    /// Get ready jobs up to the specified limit
    pub async fn get_ready_jobs(&self, now: DateTime<Utc>, limit: usize) -> Vec<QueuedJob> {
        let mut pending = self.pending.write().await;
        let mut ready_jobs = Vec::new();

        // Extract ready jobs from the heap
        let mut remaining_jobs = BinaryHeap::new();

        while let Some(Reverse(job)) = pending.pop() {
            if job.is_ready(now) && ready_jobs.len() < limit {
                ready_jobs.push(job);
            } else {
                remaining_jobs.push(Reverse(job));
            }
        }

        // Put back jobs that weren't ready or exceeded limit
        *pending = remaining_jobs;

        if !ready_jobs.is_empty() {
            debug!("Retrieved {} ready jobs from queue", ready_jobs.len());
        }

        ready_jobs
    }

    /// Remove a pending job by its deduplication key
    ///
    /// Running jobs are untouched; their key is released by `mark_completed`.
    /// Returns true if a pending job was removed.
    pub async fn cancel_pending(&self, job_key: &str) -> bool {
        let mut job_keys = self.job_keys.write().await;
        let mut pending = self.pending.write().await;

        let before = pending.len();
        let remaining: BinaryHeap<Reverse<QueuedJob>> = pending
            .drain()
            .filter(|Reverse(job)| job.job_key() != job_key)
            .collect();
        let removed = before != remaining.len();
        *pending = remaining;

        if removed {
            job_keys.remove(job_key);
            info!("Cancelled pending job {}", job_key);
        }

        removed
    }

    /// Mark a job as running
    pub async fn mark_running(&self, job_id: Uuid, job_key: String) {
        let mut running = self.running.write().await;
        running.insert(job_id, job_key.clone());

        debug!("Marked job {} as running", job_key);
    }

    /// Mark a job as completed and remove from tracking
    pub async fn mark_completed(&self, job_id: Uuid) {
        let mut running = self.running.write().await;

        if let Some(job_key) = running.remove(&job_id) {
            drop(running);

            let mut job_keys = self.job_keys.write().await;
            job_keys.remove(&job_key);

            debug!("Job {} completed and removed from tracking", job_key);
        } else {
            warn!("Attempted to mark unknown job {} as completed", job_id);
        }
    }

    /// Get the number of currently running jobs
    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }

    /// Get the number of pending jobs
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Get queue statistics
    pub async fn stats(&self) -> QueueStats {
        // Each counter takes its guard in its own statement so no map guard
        // is held while acquiring the next.
        let pending_jobs = self.pending.read().await.len();
        let running_jobs = self.running.read().await.len();
        let total_tracked_keys = self.job_keys.read().await.len();

        QueueStats {
            pending_jobs,
            running_jobs,
            total_tracked_keys,
        }
    }

    /// Check if a specific job key is already tracked (pending or running)
    pub async fn contains_job_key(&self, job_key: &str) -> bool {
        self.job_keys.read().await.contains(job_key)
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(crate::config::defaults::default_max_pending())
    }
}

/// Statistics about the job queue state
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueStats {
    /// Number of jobs waiting to be executed
    pub pending_jobs: usize,
    /// Number of jobs currently being executed
    pub running_jobs: usize,
    /// Total number of tracked job keys (should equal pending + running)
    pub total_tracked_keys: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::types::{JobKind, JobPriority};
    use chrono::Duration;

    #[tokio::test]
    async fn test_enqueue_and_deduplication() {
        let queue = JobQueue::default();

        let job1 = QueuedJob::new(
            JobKind::Capture {
                camera_id: 1,
                timelapse_id: 7,
            },
            JobPriority::Normal,
        );

        // Same timelapse, different camera - still a duplicate capture
        let job2 = QueuedJob::new(
            JobKind::Capture {
                camera_id: 2,
                timelapse_id: 7,
            },
            JobPriority::High,
        );

        let result1 = queue.enqueue(job1).await.unwrap();
        assert!(result1);

        let result2 = queue.enqueue(job2).await.unwrap();
        assert!(!result2);

        let stats = queue.stats().await;
        assert_eq!(stats.pending_jobs, 1);
        assert_eq!(stats.total_tracked_keys, 1);
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let queue = JobQueue::default();
        let now = Utc::now();

        // Add jobs in reverse priority order
        let low_job = QueuedJob::new_at(
            JobKind::ThumbnailGeneration { image_id: 1 },
            JobPriority::Low,
            now,
        );

        let critical_job = QueuedJob::new_at(
            JobKind::VideoCancellation {
                video_id: 5,
                target_job_id: "immediate_video_5".to_string(),
            },
            JobPriority::Critical,
            now,
        );

        let normal_job = QueuedJob::new_at(
            JobKind::Capture {
                camera_id: 1,
                timelapse_id: 1,
            },
            JobPriority::Normal,
            now,
        );

        queue.enqueue(low_job).await.unwrap();
        queue.enqueue(critical_job.clone()).await.unwrap();
        queue.enqueue(normal_job).await.unwrap();

        // Should get jobs in priority order
        let ready_jobs = queue.get_ready_jobs(now, 10).await;
        assert_eq!(ready_jobs.len(), 3);

        assert_eq!(ready_jobs[0].priority, JobPriority::Critical);
        assert_eq!(ready_jobs[0].id, critical_job.id);
    }

    #[tokio::test]
    async fn test_ready_jobs_filtering() {
        let queue = JobQueue::default();
        let now = Utc::now();

        let ready_job = QueuedJob::new_at(
            JobKind::OverlayGeneration { image_id: 10 },
            JobPriority::Low,
            now - Duration::minutes(1), // Ready now
        );

        let future_job = QueuedJob::new_at(
            JobKind::OverlayGeneration { image_id: 11 },
            JobPriority::Low,
            now + Duration::minutes(10), // Not ready yet
        );

        queue.enqueue(ready_job.clone()).await.unwrap();
        queue.enqueue(future_job).await.unwrap();

        let ready_jobs = queue.get_ready_jobs(now, 10).await;
        assert_eq!(ready_jobs.len(), 1);
        assert_eq!(ready_jobs[0].id, ready_job.id);

        // Future job should still be in pending
        let stats = queue.stats().await;
        assert_eq!(stats.pending_jobs, 1);
    }

    #[tokio::test]
    async fn test_running_lifecycle_releases_key() {
        let queue = JobQueue::default();
        let job = QueuedJob::new(
            JobKind::Capture {
                camera_id: 1,
                timelapse_id: 3,
            },
            JobPriority::Normal,
        );
        let job_key = job.job_key();
        let job_id = job.id;

        queue.enqueue(job).await.unwrap();
        let ready_jobs = queue.get_ready_jobs(Utc::now(), 1).await;
        assert_eq!(ready_jobs.len(), 1);

        queue.mark_running(job_id, job_key.clone()).await;
        assert_eq!(queue.running_count().await, 1);

        // Job key should still be tracked (prevents duplicates)
        assert!(queue.contains_job_key(&job_key).await);

        queue.mark_completed(job_id).await;
        assert_eq!(queue.running_count().await, 0);

        // Job key should no longer be tracked
        assert!(!queue.contains_job_key(&job_key).await);
    }

    #[tokio::test]
    async fn test_limit_ready_jobs() {
        let queue = JobQueue::default();
        let now = Utc::now();

        for i in 0..5 {
            let job = QueuedJob::new_at(
                JobKind::ThumbnailGeneration { image_id: i },
                JobPriority::Low,
                now,
            );
            queue.enqueue(job).await.unwrap();
        }

        // Request only 3 jobs
        let ready_jobs = queue.get_ready_jobs(now, 3).await;
        assert_eq!(ready_jobs.len(), 3);

        // 2 jobs should remain pending
        let stats = queue.stats().await;
        assert_eq!(stats.pending_jobs, 2);
    }

    #[tokio::test]
    async fn test_queue_full_refuses_enqueue() {
        let queue = JobQueue::new(2);

        for i in 0..2 {
            let job = QueuedJob::new(
                JobKind::ThumbnailGeneration { image_id: i },
                JobPriority::Low,
            );
            assert!(queue.enqueue(job).await.unwrap());
        }

        let overflow = QueuedJob::new(
            JobKind::ThumbnailGeneration { image_id: 99 },
            JobPriority::Low,
        );
        let result = queue.enqueue(overflow).await;
        assert!(matches!(
            result,
            Err(SchedulerError::QueueFull { pending: 2 })
        ));

        // The refused job's key must not linger and block a retry
        assert!(!queue.contains_job_key("thumbnail:99").await);
    }

    #[tokio::test]
    async fn test_cancel_pending_releases_key() {
        let queue = JobQueue::default();

        let job = QueuedJob::new(
            JobKind::VideoGeneration {
                timelapse_id: 4,
                settings: None,
            },
            JobPriority::High,
        );
        let job_key = job.job_key();
        queue.enqueue(job).await.unwrap();

        assert!(queue.cancel_pending(&job_key).await);
        assert_eq!(queue.pending_count().await, 0);
        assert!(!queue.contains_job_key(&job_key).await);

        // Cancelling again is a no-op
        assert!(!queue.cancel_pending(&job_key).await);

        // The key is free for a fresh job
        let again = QueuedJob::new(
            JobKind::VideoGeneration {
                timelapse_id: 4,
                settings: None,
            },
            JobPriority::High,
        );
        assert!(queue.enqueue(again).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stats_never_blocks_enqueue_or_cancellation() {
        // A host polling stats while the scheduler churns jobs takes the
        // same maps from the other side; both tasks finishing is the
        // assertion.
        let queue = Arc::new(JobQueue::default());

        let churn = {
            let queue = queue.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    let job = QueuedJob::new(
                        JobKind::Capture {
                            camera_id: 1,
                            timelapse_id: 999,
                        },
                        JobPriority::Normal,
                    );
                    queue.enqueue(job).await.unwrap();
                    queue.cancel_pending("capture:999").await;
                }
            })
        };

        let poller = {
            let queue = queue.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    queue.stats().await;
                }
            })
        };

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            churn.await.unwrap();
            poller.await.unwrap();
        })
        .await
        .expect("queue snapshot and mutation paths must not block each other");
    }
}
