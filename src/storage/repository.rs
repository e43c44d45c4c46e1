//! The narrow persistence interface consumed by the core.
//!
//! Everything the discovery coordinator and queue manager know about
//! storage goes through [`Repository`]. The claim and the status
//! transitions are conditional updates (`... WHERE status = ?`), never
//! read-then-write, which is what guarantees at-most-one concurrent
//! download per video even when sweeps overlap.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::BTreeMap;

use crate::core::error::RepoError;
use crate::model::{Artist, IdMerge, NewVideo, SourceId, Video, VideoStatus};
use crate::storage::db::{get_connection, DbPool};

/// A status transition requested by the queue manager.
///
/// All variants apply only to videos currently in DOWNLOADING; a transition
/// whose precondition no longer holds updates nothing and returns `false`.
#[derive(Debug, Clone)]
pub enum VideoTransition {
    /// DOWNLOADING → DOWNLOADED, recording where the media landed.
    Downloaded { file_path: String },
    /// DOWNLOADING → WANTED with the bumped retry count (retryable failure).
    RequeueWanted { retry_count: u32, error: String },
    /// DOWNLOADING → FAILED (terminal failure or retries exhausted).
    Failed { error: String },
}

/// Durable store for artists and videos.
pub trait Repository: Send + Sync {
    fn add_artist(&self, name: &str) -> Result<Artist, RepoError>;
    fn artist(&self, id: i64) -> Result<Option<Artist>, RepoError>;

    /// Monitored artists whose last discovery is older than their interval
    /// (per-artist override, else `default_interval_mins`), ascending id.
    fn artists_eligible_for_discovery(
        &self,
        now: DateTime<Utc>,
        default_interval_mins: i64,
    ) -> Result<Vec<Artist>, RepoError>;

    fn videos_for_artist(&self, artist_id: i64) -> Result<Vec<Video>, RepoError>;
    fn video(&self, id: i64) -> Result<Option<Video>, RepoError>;

    fn insert_new_videos(&self, videos: &[NewVideo]) -> Result<usize, RepoError>;
    fn merge_external_id(&self, merge: &IdMerge) -> Result<(), RepoError>;

    /// Atomically claim up to `limit` WANTED videos (oldest created first),
    /// transitioning each to DOWNLOADING. Returns only the videos whose
    /// claim succeeded.
    fn claim_wanted_videos(&self, limit: usize) -> Result<Vec<Video>, RepoError>;

    /// Apply a transition; returns `false` when the precondition no longer
    /// held (e.g. the video was manually curated meanwhile).
    fn update_video_status(&self, video_id: i64, transition: &VideoTransition) -> Result<bool, RepoError>;

    /// Record a successful discovery pass for the artist.
    fn touch_artist_discovery(&self, artist_id: i64, at: DateTime<Utc>) -> Result<(), RepoError>;

    /// Record a failed discovery pass; returns the consecutive error count.
    fn record_artist_discovery_error(&self, artist_id: i64, error: &str) -> Result<u32, RepoError>;

    /// Number of WANTED videos (the downloadable backlog).
    fn queue_depth(&self) -> Result<usize, RepoError>;

    // Doors used by outer layers (UI/API), never by the core itself.

    fn set_artist_monitored(&self, artist_id: i64, monitored: bool) -> Result<(), RepoError>;

    /// Manual curation: unconditional status write (IGNORED, MONITORED,
    /// or resetting a FAILED video back to WANTED).
    fn override_video_status(&self, video_id: i64, status: VideoStatus) -> Result<(), RepoError>;
}

/// Production repository over the SQLite pool.
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// Millisecond precision: fixed width (lexicographically ordered) and within
// the fractional-seconds format SQLite's date functions parse.
fn ts_to_db(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ts_from_db(s: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepoError::CorruptRow(format!("bad timestamp '{}': {}", s, e)))
}

const ARTIST_COLUMNS: &str =
    "id, name, monitored, discovery_interval_mins, last_discovery_at, created_at";

fn parse_artist(row: &Row<'_>) -> rusqlite::Result<(i64, String, bool, Option<i64>, Option<String>, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get::<_, i64>(2)? != 0,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn artist_from_parts(
    parts: (i64, String, bool, Option<i64>, Option<String>, String),
) -> Result<Artist, RepoError> {
    let (id, name, monitored, interval, last, created) = parts;
    Ok(Artist {
        id,
        name,
        monitored,
        discovery_interval_mins: interval,
        last_discovery_at: last.as_deref().map(ts_from_db).transpose()?,
        created_at: ts_from_db(&created)?,
    })
}

const VIDEO_COLUMNS: &str = "id, artist_id, title, external_ids, status, file_path, duration_secs, \
                             published_at, retry_count, last_error, created_at, updated_at";

#[allow(clippy::type_complexity)]
fn parse_video_row(
    row: &Row<'_>,
) -> rusqlite::Result<(
    i64,
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<u32>,
    Option<String>,
    u32,
    Option<String>,
    String,
    String,
)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

#[allow(clippy::type_complexity)]
fn video_from_parts(
    parts: (
        i64,
        i64,
        String,
        String,
        String,
        Option<String>,
        Option<u32>,
        Option<String>,
        u32,
        Option<String>,
        String,
        String,
    ),
) -> Result<Video, RepoError> {
    let (id, artist_id, title, ids_json, status, file_path, duration, published, retries, last_error, created, updated) =
        parts;

    let external_ids: BTreeMap<String, String> = serde_json::from_str(&ids_json)
        .map_err(|e| RepoError::CorruptRow(format!("bad external_ids for video {}: {}", id, e)))?;
    let status = VideoStatus::parse(&status)
        .ok_or_else(|| RepoError::CorruptRow(format!("unknown status '{}' for video {}", status, id)))?;

    Ok(Video {
        id,
        artist_id,
        title,
        external_ids: external_ids.into_iter().map(|(k, v)| (SourceId::new(k), v)).collect(),
        status,
        file_path,
        duration_secs: duration,
        published_at: published.as_deref().map(ts_from_db).transpose()?,
        retry_count: retries,
        last_error,
        created_at: ts_from_db(&created)?,
        updated_at: ts_from_db(&updated)?,
    })
}

fn external_ids_json(ids: &BTreeMap<SourceId, String>) -> String {
    let plain: BTreeMap<&str, &str> = ids.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    serde_json::to_string(&plain).unwrap_or_else(|_| "{}".to_string())
}

impl Repository for SqliteRepository {
    fn add_artist(&self, name: &str) -> Result<Artist, RepoError> {
        let conn = get_connection(&self.pool)?;
        let now = ts_to_db(Utc::now());
        conn.execute(
            "INSERT INTO artists (name, monitored, created_at, updated_at) VALUES (?1, 1, ?2, ?2)",
            params![name, now],
        )?;
        let id = conn.last_insert_rowid();
        self.artist(id)?
            .ok_or_else(|| RepoError::CorruptRow(format!("artist {} vanished after insert", id)))
    }

    fn artist(&self, id: i64) -> Result<Option<Artist>, RepoError> {
        let conn = get_connection(&self.pool)?;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM artists WHERE id = ?1", ARTIST_COLUMNS),
                params![id],
                parse_artist,
            )
            .optional()?;
        parts.map(artist_from_parts).transpose()
    }

    fn artists_eligible_for_discovery(
        &self,
        now: DateTime<Utc>,
        default_interval_mins: i64,
    ) -> Result<Vec<Artist>, RepoError> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM artists
             WHERE monitored = 1
               AND (last_discovery_at IS NULL
                    OR (julianday(?1) - julianday(last_discovery_at)) * 1440.0
                       >= COALESCE(discovery_interval_mins, ?2))
             ORDER BY id ASC",
            ARTIST_COLUMNS
        ))?;

        let rows = stmt.query_map(params![ts_to_db(now), default_interval_mins], parse_artist)?;
        let mut artists = Vec::new();
        for row in rows {
            artists.push(artist_from_parts(row?)?);
        }
        Ok(artists)
    }

    fn videos_for_artist(&self, artist_id: i64) -> Result<Vec<Video>, RepoError> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM videos WHERE artist_id = ?1 ORDER BY id ASC",
            VIDEO_COLUMNS
        ))?;
        let rows = stmt.query_map(params![artist_id], parse_video_row)?;
        let mut videos = Vec::new();
        for row in rows {
            videos.push(video_from_parts(row?)?);
        }
        Ok(videos)
    }

    fn video(&self, id: i64) -> Result<Option<Video>, RepoError> {
        let conn = get_connection(&self.pool)?;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM videos WHERE id = ?1", VIDEO_COLUMNS),
                params![id],
                parse_video_row,
            )
            .optional()?;
        parts.map(video_from_parts).transpose()
    }

    fn insert_new_videos(&self, videos: &[NewVideo]) -> Result<usize, RepoError> {
        let conn = get_connection(&self.pool)?;
        let now = ts_to_db(Utc::now());
        let mut inserted = 0;
        for video in videos {
            conn.execute(
                "INSERT INTO videos (artist_id, title, external_ids, status, duration_secs,
                                     published_at, retry_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'wanted', ?4, ?5, 0, ?6, ?6)",
                params![
                    video.artist_id,
                    video.title,
                    external_ids_json(&video.external_ids),
                    video.duration_secs,
                    video.published_at.map(ts_to_db),
                    now,
                ],
            )?;
            inserted += 1;
        }
        Ok(inserted)
    }

    fn merge_external_id(&self, merge: &IdMerge) -> Result<(), RepoError> {
        let conn = get_connection(&self.pool)?;
        let ids_json: Option<String> = conn
            .query_row(
                "SELECT external_ids FROM videos WHERE id = ?1",
                params![merge.video_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(ids_json) = ids_json else {
            return Err(RepoError::CorruptRow(format!(
                "id merge targets missing video {}",
                merge.video_id
            )));
        };

        let mut ids: BTreeMap<String, String> = serde_json::from_str(&ids_json)
            .map_err(|e| RepoError::CorruptRow(format!("bad external_ids for video {}: {}", merge.video_id, e)))?;

        // First source to report an id wins; a conflicting id from the same
        // source is kept out rather than silently overwritten.
        if ids.contains_key(merge.source.as_str()) {
            return Ok(());
        }
        ids.insert(merge.source.as_str().to_string(), merge.external_id.clone());

        conn.execute(
            "UPDATE videos SET external_ids = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                merge.video_id,
                serde_json::to_string(&ids)
                    .map_err(|e| RepoError::CorruptRow(format!("unserializable external_ids: {}", e)))?,
                ts_to_db(Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn claim_wanted_videos(&self, limit: usize) -> Result<Vec<Video>, RepoError> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare(
            "SELECT id FROM videos WHERE status = 'wanted' ORDER BY created_at ASC, id ASC LIMIT ?1",
        )?;
        let ids: Vec<i64> = stmt
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            // Conditional claim: only the sweep that flips the row wins.
            let updated = conn.execute(
                "UPDATE videos SET status = 'downloading', updated_at = ?2
                 WHERE id = ?1 AND status = 'wanted'",
                params![id, ts_to_db(Utc::now())],
            )?;
            if updated == 1 {
                if let Some(video) = self.video(id)? {
                    claimed.push(video);
                }
            }
        }
        Ok(claimed)
    }

    fn update_video_status(&self, video_id: i64, transition: &VideoTransition) -> Result<bool, RepoError> {
        let conn = get_connection(&self.pool)?;
        let now = ts_to_db(Utc::now());
        let updated = match transition {
            VideoTransition::Downloaded { file_path } => conn.execute(
                "UPDATE videos SET status = 'downloaded', file_path = ?2, last_error = NULL, updated_at = ?3
                 WHERE id = ?1 AND status = 'downloading'",
                params![video_id, file_path, now],
            )?,
            VideoTransition::RequeueWanted { retry_count, error } => conn.execute(
                "UPDATE videos SET status = 'wanted', retry_count = ?2, last_error = ?3, updated_at = ?4
                 WHERE id = ?1 AND status = 'downloading'",
                params![video_id, retry_count, error, now],
            )?,
            VideoTransition::Failed { error } => conn.execute(
                "UPDATE videos SET status = 'failed', last_error = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'downloading'",
                params![video_id, error, now],
            )?,
        };
        Ok(updated == 1)
    }

    fn touch_artist_discovery(&self, artist_id: i64, at: DateTime<Utc>) -> Result<(), RepoError> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "UPDATE artists SET last_discovery_at = ?2, last_discovery_error = NULL,
                                consecutive_discovery_errors = 0, updated_at = ?3
             WHERE id = ?1",
            params![artist_id, ts_to_db(at), ts_to_db(Utc::now())],
        )?;
        Ok(())
    }

    fn record_artist_discovery_error(&self, artist_id: i64, error: &str) -> Result<u32, RepoError> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "UPDATE artists SET last_discovery_error = ?2,
                                consecutive_discovery_errors = consecutive_discovery_errors + 1,
                                updated_at = ?3
             WHERE id = ?1",
            params![artist_id, error, ts_to_db(Utc::now())],
        )?;
        Ok(conn.query_row(
            "SELECT consecutive_discovery_errors FROM artists WHERE id = ?1",
            params![artist_id],
            |row| row.get(0),
        )?)
    }

    fn queue_depth(&self) -> Result<usize, RepoError> {
        let conn = get_connection(&self.pool)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM videos WHERE status = 'wanted'", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    fn set_artist_monitored(&self, artist_id: i64, monitored: bool) -> Result<(), RepoError> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "UPDATE artists SET monitored = ?2, updated_at = ?3 WHERE id = ?1",
            params![artist_id, monitored as i64, ts_to_db(Utc::now())],
        )?;
        Ok(())
    }

    fn override_video_status(&self, video_id: i64, status: VideoStatus) -> Result<(), RepoError> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "UPDATE videos SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![video_id, status.as_str(), ts_to_db(Utc::now())],
        )?;
        Ok(())
    }
}
