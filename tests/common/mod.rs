//! Shared fixtures: scripted sources, scripted downloader, settings
//! providers, repository helpers.
//!
//! Not every integration binary uses every fixture.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vidra::core::error::{FetchError, SettingsError, SourceError};
use vidra::discovery::GateConfig;
use vidra::download::fetch::{FetchedMedia, MediaDownloader};
use vidra::model::{Artist, SourceId, Video, VideoCandidate};
use vidra::settings::{ScheduleConfig, SettingsProvider};
use vidra::sources::VideoSource;
use vidra::storage::db::create_pool;
use vidra::storage::{Repository, SqliteRepository};

/// Fresh repository on a throwaway database file.
pub fn temp_repo() -> Arc<dyn Repository> {
    let path = std::env::temp_dir()
        .join(format!("vidra_it_{}.sqlite", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();
    Arc::new(SqliteRepository::new(
        create_pool(&path).expect("test database pool"),
    ))
}

/// Gate tuned for tests: no pacing delay, breaker after 2 failures.
pub fn fast_gate() -> GateConfig {
    GateConfig {
        min_call_delay: Duration::ZERO,
        max_consecutive_errors: 2,
    }
}

#[derive(Clone, Copy)]
pub enum SourceMode {
    Ok,
    Unavailable,
}

/// A provider returning a fixed set of (external_id, title) pairs for every
/// artist it is asked about. Counts calls; optionally slow or failing.
pub struct ScriptedSource {
    source_id: &'static str,
    videos: Vec<(String, String)>,
    mode: SourceMode,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn ok(source_id: &'static str, videos: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            source_id,
            videos: videos
                .iter()
                .map(|(ext, title)| (ext.to_string(), title.to_string()))
                .collect(),
            mode: SourceMode::Ok,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unavailable(source_id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            source_id,
            videos: Vec::new(),
            mode: SourceMode::Unavailable,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(source_id: &'static str, videos: &[(&str, &str)], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            source_id,
            videos: videos
                .iter()
                .map(|(ext, title)| (ext.to_string(), title.to_string()))
                .collect(),
            mode: SourceMode::Ok,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoSource for ScriptedSource {
    fn id(&self) -> SourceId {
        SourceId::new(self.source_id)
    }

    fn display_name(&self) -> &str {
        self.source_id
    }

    async fn search(
        &self,
        artist: &Artist,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<VideoCandidate>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.mode {
            SourceMode::Unavailable => Err(SourceError::Unavailable("scripted outage".to_string())),
            SourceMode::Ok => Ok(self
                .videos
                .iter()
                .map(|(ext, title)| VideoCandidate {
                    source: SourceId::new(self.source_id),
                    external_id: ext.clone(),
                    title: title.clone(),
                    artist_id: artist.id,
                    duration_secs: None,
                    published_at: None,
                    score: 0.8,
                })
                .collect()),
        }
    }
}

#[derive(Clone, Copy)]
pub enum DownloadMode {
    Succeed,
    Retryable,
}

/// Downloader double; records fetches.
pub struct ScriptedDownloader {
    mode: DownloadMode,
    pub fetches: AtomicUsize,
}

impl ScriptedDownloader {
    pub fn new(mode: DownloadMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MediaDownloader for ScriptedDownloader {
    async fn fetch(&self, video: &Video) -> Result<FetchedMedia, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            DownloadMode::Succeed => Ok(FetchedMedia {
                file_path: format!("/media/{}/{}.mp4", video.artist_id, video.id),
                file_size: Some(2048),
            }),
            DownloadMode::Retryable => Err(FetchError::Retryable("scripted network error".to_string())),
        }
    }
}

/// Settings provider that always fails, to exercise the degraded state.
pub struct BrokenSettings;

impl SettingsProvider for BrokenSettings {
    fn schedule_config(&self) -> Result<ScheduleConfig, SettingsError> {
        Err(SettingsError::invalid("DISCOVERY_CADENCE", "scripted breakage"))
    }
}

/// Poll until `check` passes or the timeout elapses; panics on timeout.
pub async fn wait_for(what: &str, timeout: Duration, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
