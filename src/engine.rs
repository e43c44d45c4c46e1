//! The facade outer layers talk to.
//!
//! Constructs every service once at startup and passes them down as `Arc`s;
//! nothing is looked up through globals. The REST/UI layers (outside this
//! crate) call the lifecycle and trigger methods and poll `get_status()`.

use std::sync::{Arc, Mutex};

use crate::core::config;
use crate::discovery::DiscoveryCoordinator;
use crate::download::{MediaDownloader, QueueManager, YtDlpDownloader};
use crate::model::EngineStatus;
use crate::scheduler::{self, SchedulerHandle};
use crate::settings::{EnvSettings, ScheduleConfig, SettingsProvider};
use crate::sources::{ImvdbSource, SourceRegistry, YouTubeSource};
use crate::storage::{create_pool, Repository, SqliteRepository};

pub struct Engine {
    repo: Arc<dyn Repository>,
    coordinator: Arc<DiscoveryCoordinator>,
    queue: Arc<QueueManager>,
    settings: Arc<dyn SettingsProvider>,
    status: Arc<Mutex<EngineStatus>>,
    handle: tokio::sync::Mutex<Option<SchedulerHandle>>,
}

impl Engine {
    /// Wire the engine from explicit collaborators.
    pub fn new(
        repo: Arc<dyn Repository>,
        registry: Arc<SourceRegistry>,
        downloader: Arc<dyn MediaDownloader>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        let coordinator = Arc::new(DiscoveryCoordinator::new(Arc::clone(&repo), registry));
        let queue = Arc::new(QueueManager::new(Arc::clone(&repo), downloader));
        Self {
            repo,
            coordinator,
            queue,
            settings,
            status: Arc::new(Mutex::new(EngineStatus::default())),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    /// Wire the engine entirely from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let pool = create_pool(&config::DATABASE_PATH)
            .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
        let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::new(pool));

        let mut registry = SourceRegistry::new();
        if !config::sources::YOUTUBE_API_KEY.is_empty() {
            registry.register(Arc::new(YouTubeSource::new(config::sources::YOUTUBE_API_KEY.clone())));
        }
        if !config::sources::IMVDB_APP_KEY.is_empty() {
            registry.register(Arc::new(ImvdbSource::new(config::sources::IMVDB_APP_KEY.clone())));
        }
        if registry.is_empty() {
            log::warn!("No sources configured; discovery runs will find nothing");
        }

        let downloader: Arc<dyn MediaDownloader> = Arc::new(YtDlpDownloader::from_env());
        let settings: Arc<dyn SettingsProvider> = Arc::new(EnvSettings::new());

        Ok(Self::new(repo, Arc::new(registry), downloader, settings))
    }

    /// Start the scheduler (idempotent).
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            log::warn!("Engine already running, start ignored");
            return;
        }
        self.queue.ensure_workers().await;
        *handle = Some(scheduler::start(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.queue),
            Arc::clone(&self.settings),
            Arc::clone(&self.repo),
            Arc::clone(&self.status),
        ));
    }

    /// Stop the scheduler, then drain the worker pool. In-flight work
    /// resolves before this returns; no video is left DOWNLOADING.
    pub async fn stop(&self) {
        let taken = {
            let mut handle = self.handle.lock().await;
            handle.take()
        };
        match taken {
            Some(handle) => handle.stop().await,
            None => log::warn!("Engine not running, stop ignored"),
        }
        self.queue.shutdown().await;
    }

    /// Swap the schedule configuration without dropping in-flight work.
    pub async fn reload(&self, schedule: ScheduleConfig) {
        let handle = self.handle.lock().await;
        match handle.as_ref() {
            Some(handle) => handle.reload(schedule).await,
            None => log::warn!("Engine not running, reload ignored"),
        }
    }

    /// Forced discovery run outside the schedule.
    pub async fn trigger_discovery_now(&self, artist_id: Option<i64>) {
        let handle = self.handle.lock().await;
        match handle.as_ref() {
            Some(handle) => handle.trigger_discovery(artist_id).await,
            None => log::warn!("Engine not running, discovery trigger ignored"),
        }
    }

    /// Forced download sweep outside the schedule.
    pub async fn trigger_download_sweep_now(&self) {
        let handle = self.handle.lock().await;
        match handle.as_ref() {
            Some(handle) => handle.trigger_download().await,
            None => log::warn!("Engine not running, download trigger ignored"),
        }
    }

    /// Observability snapshot. The queue depth is read live so it is
    /// accurate even between sweeps.
    pub fn get_status(&self) -> EngineStatus {
        let mut status = self
            .status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        if let Ok(depth) = self.repo.queue_depth() {
            status.queue_depth = depth;
        }
        // A scheduler that exited while still installed died on a panic;
        // that requires external intervention (restart), so report it.
        if let Ok(handle) = self.handle.try_lock() {
            if handle.as_ref().is_some_and(|h| h.is_finished()) {
                status.running = false;
                status.degraded = true;
            }
        }
        status
    }

    /// The repository, for the outer layers that share it (library UI,
    /// manual curation).
    pub fn repository(&self) -> Arc<dyn Repository> {
        Arc::clone(&self.repo)
    }
}
