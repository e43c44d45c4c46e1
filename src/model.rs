//! Domain types shared across the discovery and download pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a metadata/video provider (e.g. "youtube", "imvdb").
///
/// Kept as a string wrapper rather than an enum so deployments can register
/// additional sources without touching the core.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A tracked artist.
///
/// Owned by the library; the core only reads it and stamps
/// `last_discovery_at`. The monitoring flag is flipped by outer layers.
#[derive(Debug, Clone)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub monitored: bool,
    /// Per-artist discovery interval override, in minutes. `None` uses the
    /// global default.
    pub discovery_interval_mins: Option<i64>,
    pub last_discovery_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Canonical lifecycle status of a video.
///
/// The core drives `Wanted`/`Downloading`/`Downloaded`/`Failed`. `Ignored`
/// and `Monitored` are written only by outer layers (manual curation); the
/// core never sets them and excludes them from sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Wanted,
    Downloading,
    Downloaded,
    Failed,
    Ignored,
    Monitored,
}

impl VideoStatus {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Wanted => "wanted",
            VideoStatus::Downloading => "downloading",
            VideoStatus::Downloaded => "downloaded",
            VideoStatus::Failed => "failed",
            VideoStatus::Ignored => "ignored",
            VideoStatus::Monitored => "monitored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wanted" => Some(VideoStatus::Wanted),
            "downloading" => Some(VideoStatus::Downloading),
            "downloaded" => Some(VideoStatus::Downloaded),
            "failed" => Some(VideoStatus::Failed),
            "ignored" => Some(VideoStatus::Ignored),
            "monitored" => Some(VideoStatus::Monitored),
            _ => None,
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A known music video for an artist.
///
/// Invariant: exactly one `Video` row per real-world track per artist. The
/// dedup planner enforces this through its merge key; `external_ids` grows
/// as additional sources confirm the same track.
#[derive(Debug, Clone)]
pub struct Video {
    pub id: i64,
    pub artist_id: i64,
    pub title: String,
    /// One external id per source that has surfaced this track.
    pub external_ids: BTreeMap<SourceId, String>,
    pub status: VideoStatus,
    pub file_path: Option<String>,
    pub duration_secs: Option<u32>,
    pub published_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A candidate returned by one source for one artist query.
///
/// Ephemeral: lives for the duration of a discovery run and is discarded
/// after the merge plan is built.
#[derive(Debug, Clone)]
pub struct VideoCandidate {
    pub source: SourceId,
    pub external_id: String,
    pub title: String,
    pub artist_id: i64,
    pub duration_secs: Option<u32>,
    pub published_at: Option<DateTime<Utc>>,
    /// Provider-reported match confidence, 0.0..=1.0 where available.
    pub score: f32,
}

/// A video to be inserted, produced by the dedup planner.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub artist_id: i64,
    pub title: String,
    pub external_ids: BTreeMap<SourceId, String>,
    pub duration_secs: Option<u32>,
    pub published_at: Option<DateTime<Utc>>,
}

/// An external-id confirmation to merge into an existing video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMerge {
    pub video_id: i64,
    pub source: SourceId,
    pub external_id: String,
}

/// Work item handed to the worker pool for one claimed video.
///
/// Created when a video is claimed (WANTED → DOWNLOADING) and destroyed
/// once the outcome is applied. Workers report outcomes; they never mutate
/// the task.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Unique task identifier (UUID), for log correlation.
    pub id: String,
    pub video: Video,
    /// 1-based attempt number (`retry_count + 1` at claim time).
    pub attempt: u32,
    pub claimed_at: DateTime<Utc>,
}

impl DownloadTask {
    pub fn new(video: Video) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            attempt: video.retry_count + 1,
            claimed_at: Utc::now(),
            video,
        }
    }
}

/// Outcome of one download attempt, as classified by a worker.
#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    /// Media fetched; path of the stored file.
    Completed { file_path: String },
    /// Transient failure; the video should return to WANTED.
    Retryable { error: String },
    /// Permanent failure (e.g. source says removed); never retried.
    Terminal { error: String },
}

/// Summary of one discovery run, logged and surfaced via `get_status()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryRunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub artists_processed: usize,
    pub artists_failed: usize,
    pub candidates_seen: usize,
    pub videos_added: usize,
    pub ids_merged: usize,
    pub duplicates_skipped: usize,
    pub sources_skipped: usize,
}

/// Summary of one download sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadSweepSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub claimed: usize,
    pub enqueued: usize,
}

/// Observability snapshot exposed to outer layers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    /// Set when the scheduler cannot read its configuration; cleared on the
    /// next successful snapshot.
    pub degraded: bool,
    pub last_discovery: Option<DiscoveryRunSummary>,
    pub last_download: Option<DownloadSweepSummary>,
    /// Number of WANTED videos (the downloadable backlog).
    pub queue_depth: usize,
    /// Ticks skipped because the previous run of the same kind was still
    /// in flight.
    pub ticks_coalesced: u64,
}
