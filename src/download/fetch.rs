//! Media fetching.
//!
//! The worker pool only knows the [`MediaDownloader`] trait; the production
//! implementation shells out to yt-dlp (with a youtube-dl fallback) and
//! classifies failures from stderr into retryable and terminal kinds.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::core::config;
use crate::core::error::FetchError;
use crate::model::{SourceId, Video};

/// A successfully fetched media file.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub file_path: String,
    pub file_size: Option<u64>,
}

/// External downloader collaborator: turns one video into a file on disk.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn fetch(&self, video: &Video) -> Result<FetchedMedia, FetchError>;
}

/// yt-dlp backed downloader.
pub struct YtDlpDownloader {
    bin: String,
    download_folder: PathBuf,
}

impl YtDlpDownloader {
    pub fn new(bin: String, download_folder: impl Into<PathBuf>) -> Self {
        Self {
            bin,
            download_folder: download_folder.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            config::download::YTDL_BIN.clone(),
            config::DOWNLOAD_FOLDER.as_str(),
        )
    }

    fn output_path(&self, video: &Video) -> PathBuf {
        self.download_folder
            .join(video.artist_id.to_string())
            .join(format!("{}.mp4", sanitize_filename(&video.title)))
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    async fn fetch(&self, video: &Video) -> Result<FetchedMedia, FetchError> {
        let url = watch_url(video)?;
        let output = self.output_path(video);

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::Retryable(format!("cannot create {}: {}", parent.display(), e)))?;
        }

        let output_str = output.to_string_lossy().into_owned();
        let args = [
            "-f",
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/mp4",
            "--no-playlist",
            "--no-progress",
            "-o",
            &output_str,
            url.as_str(),
        ];

        log::info!("Fetching video {} ({}) via {}", video.id, video.title, self.bin);
        let result = run_downloader(&self.bin, &args).await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            log::warn!("Downloader failed for video {}: {}", video.id, stderr.trim());
            return Err(classify_downloader_error(&stderr));
        }

        let metadata = tokio::fs::metadata(&output)
            .await
            .map_err(|_| FetchError::Retryable(format!("downloaded file missing: {}", output.display())))?;

        Ok(FetchedMedia {
            file_path: output_str,
            file_size: Some(metadata.len()),
        })
    }
}

async fn run_downloader(bin: &str, args: &[&str]) -> Result<std::process::Output, FetchError> {
    match spawn_and_wait(bin, args).await {
        Ok(output) => Ok(output),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Same fallback chain operators expect from the CLI tools.
            let fallback = "youtube-dl";
            log::warn!("'{}' not found, falling back to '{}'", bin, fallback);
            spawn_and_wait(fallback, args).await.map_err(|inner| {
                FetchError::Retryable(format!(
                    "no downloader available, tried '{}' then '{}': {} / {}",
                    bin, fallback, e, inner
                ))
            })
        }
        Err(e) => Err(FetchError::Retryable(format!("failed to run '{}': {}", bin, e))),
    }
}

async fn spawn_and_wait(bin: &str, args: &[&str]) -> std::io::Result<std::process::Output> {
    Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
}

/// Pick the fetchable page URL for a video. Only YouTube ids are directly
/// fetchable today; a video known solely to metadata-only sources cannot be
/// downloaded and fails terminally so it stops consuming sweep slots.
fn watch_url(video: &Video) -> Result<url::Url, FetchError> {
    let youtube = SourceId::new("youtube");
    let Some(video_id) = video.external_ids.get(&youtube) else {
        return Err(FetchError::Terminal(format!(
            "video {} has no fetchable source (known to: {})",
            video.id,
            video
                .external_ids
                .keys()
                .map(SourceId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    };

    url::Url::parse(&format!("https://www.youtube.com/watch?v={}", video_id))
        .map_err(|e| FetchError::Terminal(format!("unbuildable watch url: {}", e)))
}

/// Classify downloader stderr. Unknown failures default to retryable: the
/// retry cap bounds the damage, while misclassifying a transient outage as
/// terminal would strand the video in FAILED.
fn classify_downloader_error(stderr: &str) -> FetchError {
    let lower = stderr.to_lowercase();

    if lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("has been removed")
        || lower.contains("this video does not exist")
        || lower.contains("account associated with this video has been terminated")
        || lower.contains("copyright")
    {
        return FetchError::Terminal(first_line(stderr));
    }

    FetchError::Retryable(first_line(stderr))
}

fn first_line(s: &str) -> String {
    s.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("downloader failed")
        .trim()
        .to_string()
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
