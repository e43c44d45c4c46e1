//! Candidate merge planning.
//!
//! Pure and side-effect-free: given one artist's candidates from every
//! source plus the artist's already-known videos, produce the minimal set
//! of inserts and id merges. The caller applies the plan; nothing here
//! touches storage, which keeps the whole policy testable in isolation.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::model::{IdMerge, NewVideo, SourceId, Video, VideoCandidate};

/// Planned persistence operations for one artist's discovery results.
#[derive(Debug, Default)]
pub struct MergePlan {
    pub new_videos: Vec<NewVideo>,
    pub id_merges: Vec<IdMerge>,
    /// Candidates that carried no new information (already known id, or a
    /// conflicting id for an already-confirmed source).
    pub duplicates_skipped: usize,
}

/// Decorations like "(Official Video)" or "[4K]" at the end of a title.
/// Stripped repeatedly, so "Song (Official Video) [HD]" reduces to "Song".
#[allow(clippy::expect_used)]
static TRAILING_DECORATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s*[(\[](official\s+(music\s+)?video|official\s+audio|official|music\s+video|lyric\s+video|lyrics|visualizer|audio|live|hd|4k|remaster(ed)?(\s+\d{4})?)[)\]]\s*$",
    )
    .expect("static regex")
});

#[allow(clippy::expect_used)]
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// Normalize a title for fuzzy matching: case-insensitive, punctuation
/// stripped, whitespace collapsed, trailing decorations removed.
pub fn normalize_title(title: &str) -> String {
    let mut stripped = title.trim().to_string();
    loop {
        let next = TRAILING_DECORATION.replace(&stripped, "").trim().to_string();
        if next == stripped {
            break;
        }
        stripped = next;
    }
    let lower = stripped.to_lowercase();
    NON_ALNUM.replace_all(&lower, " ").trim().to_string()
}

/// Build the merge plan for one artist.
///
/// `priority` lists sources in descending metadata confidence; when several
/// candidates collapse into one new video it decides whose title/duration
/// win. The output is deterministic for a given input order.
pub fn plan_merge(candidates: &[VideoCandidate], existing: &[Video], priority: &[SourceId]) -> MergePlan {
    let mut plan = MergePlan::default();

    // Normalized titles of existing videos, computed once.
    let existing_titles: Vec<String> = existing.iter().map(|v| normalize_title(&v.title)).collect();

    // Groups of not-yet-known candidates keyed by normalized title,
    // in first-seen order.
    let mut pending: Vec<(String, Vec<&VideoCandidate>)> = Vec::new();

    for candidate in candidates {
        // (a) exact external-id match against any existing video.
        if existing
            .iter()
            .any(|v| v.external_ids.get(&candidate.source).is_some_and(|id| id == &candidate.external_id))
        {
            plan.duplicates_skipped += 1;
            continue;
        }

        // (b) fallback: normalized title match against existing videos.
        let normalized = normalize_title(&candidate.title);
        if let Some(idx) = existing_titles.iter().position(|t| !t.is_empty() && *t == normalized) {
            let video = &existing[idx];
            if video.external_ids.contains_key(&candidate.source) {
                // Same track, but this source already confirmed it under a
                // different id. Keep the known id.
                plan.duplicates_skipped += 1;
            } else if plan
                .id_merges
                .iter()
                .any(|m| m.video_id == video.id && m.source == candidate.source)
            {
                plan.duplicates_skipped += 1;
            } else {
                // (c) cross-source confirmation: new id only, no new row.
                plan.id_merges.push(IdMerge {
                    video_id: video.id,
                    source: candidate.source.clone(),
                    external_id: candidate.external_id.clone(),
                });
            }
            continue;
        }

        // (d)/(e) not known yet: group with other new candidates so one
        // track found by two sources in the same run yields one video.
        match pending.iter_mut().find(|(title, _)| *title == normalized) {
            Some((_, group)) => group.push(candidate),
            None => pending.push((normalized, vec![candidate])),
        }
    }

    for (_, group) in pending {
        plan.new_videos.push(collapse_group(&group, priority, &mut plan.duplicates_skipped));
    }

    plan
}

/// Collapse candidates that matched each other into one new video. The
/// winning candidate (priority order, then score, then input order)
/// contributes title, duration and publish date; every member contributes
/// its external id.
fn collapse_group(group: &[&VideoCandidate], priority: &[SourceId], duplicates_skipped: &mut usize) -> NewVideo {
    #[allow(clippy::expect_used)]
    let winner = group
        .iter()
        .min_by(|a, b| {
            priority_rank(&a.source, priority)
                .cmp(&priority_rank(&b.source, priority))
                .then(b.score.total_cmp(&a.score))
        })
        .expect("groups are never empty");

    let mut external_ids: BTreeMap<SourceId, String> = BTreeMap::new();
    for candidate in group {
        if external_ids.contains_key(&candidate.source) {
            // Two results from one source with the same normalized title;
            // the first one seen wins.
            *duplicates_skipped += 1;
            continue;
        }
        external_ids.insert(candidate.source.clone(), candidate.external_id.clone());
    }

    NewVideo {
        artist_id: winner.artist_id,
        title: winner.title.clone(),
        external_ids,
        duration_secs: group.iter().find_map(|c| c.duration_secs),
        published_at: winner.published_at.or_else(|| group.iter().find_map(|c| c.published_at)),
    }
}

fn priority_rank(source: &SourceId, priority: &[SourceId]) -> usize {
    priority.iter().position(|s| s == source).unwrap_or(priority.len())
}
