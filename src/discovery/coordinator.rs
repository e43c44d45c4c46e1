//! Per-tick discovery orchestration.
//!
//! One run walks the eligible artists in ascending id order (stable, so
//! repeated runs are reproducible) and, per artist, sweeps every registered
//! source through the gate, plans the merge, and applies it. Failures are
//! contained at the smallest unit that can fail independently: a bad source
//! skips that source, a bad artist skips that artist, and the run always
//! completes with a summary.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config;
use crate::core::error::{RepoError, SourceError};
use crate::discovery::dedup;
use crate::discovery::gate::{GateConfig, SourceGate};
use crate::model::{Artist, DiscoveryRunSummary, VideoCandidate};
use crate::settings::ScheduleConfig;
use crate::sources::SourceRegistry;
use crate::storage::Repository;

/// Per-artist counters folded into the run summary.
#[derive(Debug, Default)]
struct ArtistStats {
    candidates_seen: usize,
    videos_added: usize,
    ids_merged: usize,
    duplicates_skipped: usize,
    sources_skipped: usize,
}

pub struct DiscoveryCoordinator {
    repo: Arc<dyn Repository>,
    registry: Arc<SourceRegistry>,
    gate_config: GateConfig,
    search_timeout: Duration,
}

impl DiscoveryCoordinator {
    pub fn new(repo: Arc<dyn Repository>, registry: Arc<SourceRegistry>) -> Self {
        Self {
            repo,
            registry,
            gate_config: GateConfig::default(),
            search_timeout: config::sources::search_timeout(),
        }
    }

    /// Override pacing and timeout, mainly so tests run at full speed.
    pub fn with_tuning(
        repo: Arc<dyn Repository>,
        registry: Arc<SourceRegistry>,
        gate_config: GateConfig,
        search_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            registry,
            gate_config,
            search_timeout,
        }
    }

    /// Execute one discovery run.
    ///
    /// `only_artist` narrows a forced run to a single artist, bypassing the
    /// eligibility interval (the schedule never passes it).
    pub async fn run(&self, schedule: &ScheduleConfig, only_artist: Option<i64>) -> DiscoveryRunSummary {
        let mut summary = DiscoveryRunSummary {
            started_at: Some(Utc::now()),
            ..DiscoveryRunSummary::default()
        };

        // Fresh gate per run: breaker state is scoped to this run only.
        let gate = SourceGate::new(self.gate_config.clone());

        let artists = match self.select_artists(schedule, only_artist) {
            Ok(artists) => artists,
            Err(e) => {
                log::error!("Discovery run aborted, could not list artists: {}", e);
                summary.finished_at = Some(Utc::now());
                return summary;
            }
        };

        log::info!("Discovery run: {} artist(s) eligible", artists.len());

        for artist in &artists {
            match self.discover_artist(artist, schedule, &gate).await {
                Ok(stats) => {
                    summary.artists_processed += 1;
                    summary.candidates_seen += stats.candidates_seen;
                    summary.videos_added += stats.videos_added;
                    summary.ids_merged += stats.ids_merged;
                    summary.duplicates_skipped += stats.duplicates_skipped;
                    summary.sources_skipped += stats.sources_skipped;

                    if let Err(e) = self.repo.touch_artist_discovery(artist.id, Utc::now()) {
                        log::warn!("Failed to stamp discovery time for artist {}: {}", artist.id, e);
                    }
                }
                Err(e) => {
                    summary.artists_failed += 1;
                    log::warn!("Discovery failed for artist {} ({}): {}", artist.id, artist.name, e);
                    match self.repo.record_artist_discovery_error(artist.id, &e.to_string()) {
                        Ok(count) => {
                            if count >= 5 {
                                log::warn!(
                                    "Artist {} ({}) has failed discovery {} times in a row",
                                    artist.id,
                                    artist.name,
                                    count
                                );
                            }
                        }
                        Err(e) => log::warn!("Failed to record discovery error for artist {}: {}", artist.id, e),
                    }
                }
            }
        }

        summary.finished_at = Some(Utc::now());
        log::info!(
            "Discovery run finished: {} artist(s) processed, {} failed, {} candidate(s), \
             {} video(s) added, {} id(s) merged, {} duplicate(s) skipped, {} source call(s) skipped",
            summary.artists_processed,
            summary.artists_failed,
            summary.candidates_seen,
            summary.videos_added,
            summary.ids_merged,
            summary.duplicates_skipped,
            summary.sources_skipped,
        );
        summary
    }

    fn select_artists(&self, schedule: &ScheduleConfig, only_artist: Option<i64>) -> Result<Vec<Artist>, RepoError> {
        match only_artist {
            Some(id) => match self.repo.artist(id)? {
                Some(artist) => Ok(vec![artist]),
                None => {
                    log::warn!("Forced discovery requested for unknown artist {}", id);
                    Ok(Vec::new())
                }
            },
            None => self
                .repo
                .artists_eligible_for_discovery(Utc::now(), schedule.discovery_interval_mins),
        }
    }

    /// One artist: gate-paced source sweep, merge planning, single-pass
    /// plan application. Only persistence failures bubble up; source
    /// failures degrade to fewer candidates.
    async fn discover_artist(
        &self,
        artist: &Artist,
        schedule: &ScheduleConfig,
        gate: &SourceGate,
    ) -> Result<ArtistStats, RepoError> {
        let mut stats = ArtistStats::default();
        let mut candidates: Vec<VideoCandidate> = Vec::new();

        for source in self.registry.ordered(&schedule.source_priority) {
            let source_id = source.id();
            if gate.is_open(&source_id).await {
                stats.sources_skipped += 1;
                continue;
            }

            gate.pace(&source_id).await;

            let result = match tokio::time::timeout(
                self.search_timeout,
                source.search(artist, artist.last_discovery_at),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(self.search_timeout)),
            };

            match result {
                Ok(batch) => {
                    gate.record_success(&source_id).await;
                    log::debug!(
                        "{}: {} candidate(s) for artist {} ({})",
                        source.display_name(),
                        batch.len(),
                        artist.id,
                        artist.name
                    );
                    candidates.extend(batch);
                }
                Err(e) => {
                    stats.sources_skipped += 1;
                    log::warn!(
                        "{} failed for artist {} ({}): {}",
                        source.display_name(),
                        artist.id,
                        artist.name,
                        e
                    );
                    if gate.record_failure(&source_id, &e).await {
                        log::warn!(
                            "{} skipped for the remainder of this run after repeated failures",
                            source.display_name()
                        );
                    }
                }
            }
        }

        stats.candidates_seen = candidates.len();

        let existing = self.repo.videos_for_artist(artist.id)?;
        let plan = dedup::plan_merge(&candidates, &existing, &schedule.source_priority);
        stats.duplicates_skipped = plan.duplicates_skipped;

        let mut new_videos = plan.new_videos;
        if new_videos.len() > schedule.max_videos_per_artist {
            log::info!(
                "Artist {} ({}): capping {} new video(s) at {} for this run",
                artist.id,
                artist.name,
                new_videos.len(),
                schedule.max_videos_per_artist
            );
            new_videos.truncate(schedule.max_videos_per_artist);
        }

        // Apply the plan in one pass; an error here fails only this artist.
        stats.videos_added = self.repo.insert_new_videos(&new_videos)?;
        for merge in &plan.id_merges {
            self.repo.merge_external_id(merge)?;
            stats.ids_merged += 1;
        }

        Ok(stats)
    }
}
