//! Fixed-size download worker pool.
//!
//! Workers share one bounded receiver; each pulls a task, runs the fetch
//! under the configured timeout, classifies the result, and reports it
//! through the transition policy. The pool drains and joins cleanly when
//! the sender side closes, so a shutdown never abandons a DOWNLOADING
//! claim.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::core::config;
use crate::core::error::FetchError;
use crate::download::fetch::MediaDownloader;
use crate::download::queue::TransitionPolicy;
use crate::model::{DownloadOutcome, DownloadTask};

pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn spawn(
        size: usize,
        rx: mpsc::Receiver<DownloadTask>,
        downloader: Arc<dyn MediaDownloader>,
        policy: Arc<TransitionPolicy>,
    ) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..size)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let downloader = Arc::clone(&downloader);
                let policy = Arc::clone(&policy);
                tokio::spawn(worker_loop(worker_id, rx, downloader, policy))
            })
            .collect();
        log::debug!("Spawned {} download worker(s)", size);
        Self { handles }
    }

    /// Wait for every worker to finish its current download and exit.
    pub(crate) async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                log::error!("Download worker panicked: {}", e);
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<DownloadTask>>>,
    downloader: Arc<dyn MediaDownloader>,
    policy: Arc<TransitionPolicy>,
) {
    loop {
        // Holding the lock while waiting parks exactly one idle worker on
        // the channel; the rest queue up on the mutex. Either way a task is
        // handed to precisely one worker.
        let task = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(task) = task else {
            log::debug!("Worker {} stopping, intake closed", worker_id);
            return;
        };

        log::debug!(
            "Worker {} fetching video {} (task {}, attempt {})",
            worker_id,
            task.video.id,
            task.id,
            task.attempt
        );

        let outcome = match tokio::time::timeout(config::download::fetch_timeout(), downloader.fetch(&task.video))
            .await
        {
            Ok(Ok(media)) => DownloadOutcome::Completed {
                file_path: media.file_path,
            },
            Ok(Err(FetchError::Retryable(error))) => DownloadOutcome::Retryable { error },
            Ok(Err(FetchError::Terminal(error))) => DownloadOutcome::Terminal { error },
            Err(_) => DownloadOutcome::Retryable {
                error: format!("fetch timed out after {:?}", config::download::fetch_timeout()),
            },
        };

        policy.record(&task, outcome);
    }
}
