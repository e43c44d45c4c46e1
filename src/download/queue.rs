//! Download admission and the video status state machine.
//!
//! `QueueManager` owns every WANTED/DOWNLOADING/DOWNLOADED/FAILED
//! transition. A sweep claims WANTED videos oldest-first through the
//! repository's conditional update and hands them to the worker pool over a
//! bounded channel — when the pool is saturated, admission blocks instead
//! of growing a backlog in memory. Workers report outcomes back through
//! [`TransitionPolicy::record`]; they never write statuses themselves.

use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::core::config;
use crate::download::fetch::MediaDownloader;
use crate::download::worker::WorkerPool;
use crate::model::{DownloadOutcome, DownloadSweepSummary, DownloadTask};
use crate::settings::ScheduleConfig;
use crate::storage::{Repository, VideoTransition};

/// The single place download outcomes become status transitions.
///
/// Shared with the workers so they can report, but the policy itself
/// (retry accounting, terminal classification) lives here with the queue
/// manager.
pub struct TransitionPolicy {
    repo: Arc<dyn Repository>,
    max_retries: AtomicU32,
}

impl TransitionPolicy {
    fn new(repo: Arc<dyn Repository>, max_retries: u32) -> Self {
        Self {
            repo,
            max_retries: AtomicU32::new(max_retries),
        }
    }

    fn set_max_retries(&self, max: u32) {
        self.max_retries.store(max, Ordering::Relaxed);
    }

    /// Apply one download outcome to the claimed video.
    pub fn record(&self, task: &DownloadTask, outcome: DownloadOutcome) {
        let video = &task.video;
        let transition = match outcome {
            DownloadOutcome::Completed { file_path } => {
                log::info!(
                    "Video {} ({}) downloaded to {} (attempt {})",
                    video.id,
                    video.title,
                    file_path,
                    task.attempt
                );
                VideoTransition::Downloaded { file_path }
            }
            DownloadOutcome::Retryable { error } => {
                let retry_count = video.retry_count + 1;
                let max_retries = self.max_retries.load(Ordering::Relaxed);
                if retry_count > max_retries {
                    log::warn!(
                        "Video {} ({}) failed permanently after {} attempt(s): {}",
                        video.id,
                        video.title,
                        task.attempt,
                        error
                    );
                    VideoTransition::Failed { error }
                } else {
                    // Requeued; the next sweep's cadence is the backoff.
                    log::info!(
                        "Video {} ({}) requeued after attempt {} ({} of {} retries used): {}",
                        video.id,
                        video.title,
                        task.attempt,
                        retry_count,
                        max_retries,
                        error
                    );
                    VideoTransition::RequeueWanted { retry_count, error }
                }
            }
            DownloadOutcome::Terminal { error } => {
                log::warn!("Video {} ({}) failed terminally: {}", video.id, video.title, error);
                VideoTransition::Failed { error }
            }
        };

        match self.repo.update_video_status(video.id, &transition) {
            Ok(true) => {}
            Ok(false) => log::warn!(
                "Video {} changed status while downloading; outcome not applied",
                video.id
            ),
            Err(e) => log::error!("Failed to persist outcome for video {}: {}", video.id, e),
        }
    }
}

struct Intake {
    tx: mpsc::Sender<DownloadTask>,
    pool: WorkerPool,
}

/// Owns the download state machine and the worker pool.
pub struct QueueManager {
    repo: Arc<dyn Repository>,
    downloader: Arc<dyn MediaDownloader>,
    policy: Arc<TransitionPolicy>,
    pool_size: usize,
    intake: Mutex<Option<Intake>>,
}

impl QueueManager {
    /// Create the manager and spawn its workers.
    pub fn new(repo: Arc<dyn Repository>, downloader: Arc<dyn MediaDownloader>) -> Self {
        Self::with_pool_size(repo, downloader, *config::download::WORKER_POOL_SIZE)
    }

    pub fn with_pool_size(
        repo: Arc<dyn Repository>,
        downloader: Arc<dyn MediaDownloader>,
        pool_size: usize,
    ) -> Self {
        let pool_size = pool_size.max(1);
        let policy = Arc::new(TransitionPolicy::new(
            Arc::clone(&repo),
            ScheduleConfig::default().max_retries,
        ));

        // Channel capacity equals the pool size: a sweep can stage at most
        // one extra task per worker before admission blocks.
        let (tx, rx) = mpsc::channel(pool_size);
        let pool = WorkerPool::spawn(pool_size, rx, Arc::clone(&downloader), Arc::clone(&policy));

        Self {
            repo,
            downloader,
            policy,
            pool_size,
            intake: Mutex::new(Some(Intake { tx, pool })),
        }
    }

    /// Restart the workers after a shutdown (STOPPED → RUNNING again).
    pub async fn ensure_workers(&self) {
        let mut intake = self.intake.lock().await;
        if intake.is_none() {
            let (tx, rx) = mpsc::channel(self.pool_size);
            let pool = WorkerPool::spawn(
                self.pool_size,
                rx,
                Arc::clone(&self.downloader),
                Arc::clone(&self.policy),
            );
            *intake = Some(Intake { tx, pool });
            log::info!("Download worker pool restarted ({} worker(s))", self.pool_size);
        }
    }

    /// Run one download sweep: claim up to the configured cap of WANTED
    /// videos (oldest first) and admit them to the pool.
    pub async fn run_sweep(&self, schedule: &ScheduleConfig) -> DownloadSweepSummary {
        self.policy.set_max_retries(schedule.max_retries);

        let mut summary = DownloadSweepSummary {
            started_at: Some(Utc::now()),
            ..DownloadSweepSummary::default()
        };

        let claimed = match self.repo.claim_wanted_videos(schedule.max_downloads_per_sweep) {
            Ok(claimed) => claimed,
            Err(e) => {
                log::error!("Download sweep aborted, claim failed: {}", e);
                summary.finished_at = Some(Utc::now());
                return summary;
            }
        };
        summary.claimed = claimed.len();

        let tx = {
            let intake = self.intake.lock().await;
            intake.as_ref().map(|i| i.tx.clone())
        };

        for video in claimed {
            let video_id = video.id;
            let retry_count = video.retry_count;
            let task = DownloadTask::new(video);

            let sent = match &tx {
                Some(tx) => tx.send(task).await.is_ok(),
                None => false,
            };

            if sent {
                summary.enqueued += 1;
            } else {
                // Pool is shut down: release the claim without burning a
                // retry so the video is picked up by a future sweep.
                log::warn!("Worker pool unavailable, releasing claim on video {}", video_id);
                let release = VideoTransition::RequeueWanted {
                    retry_count,
                    error: "worker pool unavailable".to_string(),
                };
                if let Err(e) = self.repo.update_video_status(video_id, &release) {
                    log::error!("Failed to release claim on video {}: {}", video_id, e);
                }
            }
        }

        summary.finished_at = Some(Utc::now());
        log::info!(
            "Download sweep finished: {} claimed, {} enqueued",
            summary.claimed,
            summary.enqueued
        );
        summary
    }

    /// Stop accepting work and wait for in-flight downloads to resolve.
    /// No claim is abandoned: every admitted task reaches a terminal or
    /// requeued state before this returns.
    pub async fn shutdown(&self) {
        let intake = {
            let mut slot = self.intake.lock().await;
            slot.take()
        };
        if let Some(Intake { tx, pool }) = intake {
            drop(tx); // closes the channel; workers drain and exit
            pool.join().await;
            log::info!("Download worker pool drained and stopped");
        }
    }
}
