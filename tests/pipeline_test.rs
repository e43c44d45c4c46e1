//! End-to-end pipeline properties: discovery → dedup → persistence →
//! download, with scripted sources and downloader.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_gate, temp_repo, DownloadMode, ScriptedDownloader, ScriptedSource};
use vidra::discovery::DiscoveryCoordinator;
use vidra::download::QueueManager;
use vidra::model::{SourceId, VideoStatus};
use vidra::settings::ScheduleConfig;
use vidra::sources::SourceRegistry;

fn registry_of(sources: Vec<Arc<ScriptedSource>>) -> Arc<SourceRegistry> {
    let mut registry = SourceRegistry::new();
    for source in sources {
        registry.register(source);
    }
    Arc::new(registry)
}

fn coordinator(repo: &Arc<dyn vidra::Repository>, registry: Arc<SourceRegistry>) -> DiscoveryCoordinator {
    DiscoveryCoordinator::with_tuning(Arc::clone(repo), registry, fast_gate(), Duration::from_secs(5))
}

#[tokio::test]
async fn discovery_twice_with_identical_responses_adds_nothing_new() {
    let repo = temp_repo();
    let artist = repo.add_artist("X").unwrap();

    let youtube = ScriptedSource::ok("youtube", &[("yt1", "X - Song (Official Video)")]);
    let imvdb = ScriptedSource::ok("imvdb", &[("imv1", "X - Song")]);
    let coordinator = coordinator(&repo, registry_of(vec![youtube, imvdb]));
    let config = ScheduleConfig::default();

    let first = coordinator.run(&config, Some(artist.id)).await;
    assert_eq!(first.videos_added, 1);

    let second = coordinator.run(&config, Some(artist.id)).await;
    assert_eq!(second.videos_added, 0, "identical responses must add nothing");
    assert_eq!(second.ids_merged, 0);

    assert_eq!(repo.videos_for_artist(artist.id).unwrap().len(), 1);
}

#[tokio::test]
async fn cross_source_confirmation_merges_ids_instead_of_duplicating() {
    // The worked example: artist "X" already has {youtube: "abc"}; YouTube
    // re-surfaces it decorated, IMVDb finds the same track under its own id.
    let repo = temp_repo();
    let artist = repo.add_artist("X").unwrap();

    let mut ids = std::collections::BTreeMap::new();
    ids.insert(SourceId::new("youtube"), "abc".to_string());
    repo.insert_new_videos(&[vidra::model::NewVideo {
        artist_id: artist.id,
        title: "X - Song".to_string(),
        external_ids: ids,
        duration_secs: None,
        published_at: None,
    }])
    .unwrap();

    let youtube = ScriptedSource::ok("youtube", &[("abc", "X - Song (Official Video)")]);
    let imvdb = ScriptedSource::ok("imvdb", &[("imv-42", "X - Song")]);
    let coordinator = coordinator(&repo, registry_of(vec![youtube, imvdb]));

    let summary = coordinator.run(&ScheduleConfig::default(), Some(artist.id)).await;
    assert_eq!(summary.videos_added, 0, "no new video may be created");
    assert_eq!(summary.ids_merged, 1);

    let videos = repo.videos_for_artist(artist.id).unwrap();
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].external_ids.get(&SourceId::new("youtube")), Some(&"abc".to_string()));
    assert_eq!(videos[0].external_ids.get(&SourceId::new("imvdb")), Some(&"imv-42".to_string()));
}

#[tokio::test]
async fn one_track_found_by_two_sources_becomes_one_wanted_video() {
    let repo = temp_repo();
    let artist = repo.add_artist("X").unwrap();

    let youtube = ScriptedSource::ok("youtube", &[("yt9", "X - New Single (Official Video)")]);
    let imvdb = ScriptedSource::ok("imvdb", &[("imv9", "X - New Single")]);
    let coordinator = coordinator(&repo, registry_of(vec![youtube, imvdb]));

    let summary = coordinator.run(&ScheduleConfig::default(), Some(artist.id)).await;
    assert_eq!(summary.videos_added, 1);

    let videos = repo.videos_for_artist(artist.id).unwrap();
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].status, VideoStatus::Wanted);
    assert_eq!(videos[0].external_ids.len(), 2, "both external ids retained");
}

#[tokio::test]
async fn unavailable_source_does_not_block_the_others() {
    let repo = temp_repo();
    let artist = repo.add_artist("X").unwrap();

    let broken = ScriptedSource::unavailable("imvdb");
    let youtube = ScriptedSource::ok("youtube", &[("yt1", "X - Song")]);
    let coordinator = coordinator(&repo, registry_of(vec![broken, youtube]));

    let summary = coordinator.run(&ScheduleConfig::default(), Some(artist.id)).await;
    assert_eq!(summary.videos_added, 1, "healthy source still lands its candidate");
    assert!(summary.sources_skipped >= 1);
    assert_eq!(summary.artists_failed, 0, "a source failure is not an artist failure");
}

#[tokio::test]
async fn circuit_breaker_stops_calling_a_dead_source_within_one_run() {
    let repo = temp_repo();
    for name in ["A", "B", "C", "D", "E"] {
        repo.add_artist(name).unwrap();
    }

    let broken = ScriptedSource::unavailable("imvdb");
    let broken_probe = Arc::clone(&broken);
    let healthy = ScriptedSource::ok("youtube", &[]);
    let healthy_probe = Arc::clone(&healthy);
    let coordinator = coordinator(&repo, registry_of(vec![broken, healthy]));

    coordinator.run(&ScheduleConfig::default(), None).await;

    // fast_gate trips the breaker after 2 consecutive failures; the other
    // three artists skip the source without calling it.
    assert_eq!(broken_probe.call_count(), 2);
    assert_eq!(healthy_probe.call_count(), 5, "healthy source unaffected by the breaker");
}

#[tokio::test]
async fn discovered_videos_flow_through_the_download_pipeline() {
    let repo = temp_repo();
    let artist = repo.add_artist("X").unwrap();

    let youtube = ScriptedSource::ok("youtube", &[("yt1", "X - Song"), ("yt2", "X - Other Song")]);
    let coordinator = coordinator(&repo, registry_of(vec![youtube]));
    let config = ScheduleConfig::default();

    coordinator.run(&config, Some(artist.id)).await;
    assert_eq!(repo.queue_depth().unwrap(), 2);

    let downloader = ScriptedDownloader::new(DownloadMode::Succeed);
    let queue = QueueManager::with_pool_size(Arc::clone(&repo), downloader, 2);
    let summary = queue.run_sweep(&config).await;
    assert_eq!(summary.claimed, 2);

    let repo_probe = Arc::clone(&repo);
    common::wait_for("downloads to settle", Duration::from_secs(2), move || {
        repo_probe
            .videos_for_artist(artist.id)
            .unwrap()
            .iter()
            .all(|v| v.status == VideoStatus::Downloaded)
    })
    .await;

    let videos = repo.videos_for_artist(artist.id).unwrap();
    assert!(videos.iter().all(|v| v.file_path.is_some()));
    assert_eq!(repo.queue_depth().unwrap(), 0);

    queue.shutdown().await;
}

#[tokio::test]
async fn per_artist_cap_limits_stored_videos() {
    let repo = temp_repo();
    let artist = repo.add_artist("Prolific").unwrap();

    let youtube = ScriptedSource::ok(
        "youtube",
        &[
            ("a", "Prolific - One"),
            ("b", "Prolific - Two"),
            ("c", "Prolific - Three"),
            ("d", "Prolific - Four"),
        ],
    );
    let coordinator = coordinator(&repo, registry_of(vec![youtube]));
    let config = ScheduleConfig {
        max_videos_per_artist: 2,
        ..ScheduleConfig::default()
    };

    let summary = coordinator.run(&config, Some(artist.id)).await;
    assert_eq!(summary.videos_added, 2);
    assert_eq!(repo.videos_for_artist(artist.id).unwrap().len(), 2);
}
