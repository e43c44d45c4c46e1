//! YouTube Data API v3 source adapter.
//!
//! Uses the search endpoint restricted to the Music category. The search
//! response carries no durations; those arrive later when another source
//! confirms the track, or stay unknown.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::core::error::SourceError;
use crate::model::{Artist, SourceId, VideoCandidate};
use crate::sources::VideoSource;

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const MUSIC_CATEGORY_ID: &str = "10";
const MAX_RESULTS: u32 = 50;

pub struct YouTubeSource {
    client: reqwest::Client,
    api_key: String,
}

impl YouTubeSource {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl VideoSource for YouTubeSource {
    fn id(&self) -> SourceId {
        SourceId::new("youtube")
    }

    fn display_name(&self) -> &str {
        "YouTube"
    }

    async fn search(
        &self,
        artist: &Artist,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<VideoCandidate>, SourceError> {
        let mut query = vec![
            ("part".to_string(), "snippet".to_string()),
            ("type".to_string(), "video".to_string()),
            ("videoCategoryId".to_string(), MUSIC_CATEGORY_ID.to_string()),
            ("order".to_string(), "date".to_string()),
            ("maxResults".to_string(), MAX_RESULTS.to_string()),
            ("q".to_string(), format!("{} music video", artist.name)),
            ("key".to_string(), self.api_key.clone()),
        ];
        if let Some(since) = since {
            query.push((
                "publishedAfter".to_string(),
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&query)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(format!("youtube request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status == reqwest::StatusCode::FORBIDDEN {
            // 403 is how the Data API reports quota exhaustion.
            return Err(SourceError::RateLimited(format!("youtube returned {}", status)));
        }
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!("youtube returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Unavailable(format!("youtube sent bad JSON: {}", e)))?;

        Ok(parse_search_response(&body, artist))
    }
}

/// Extract candidates from a search response body.
fn parse_search_response(body: &Value, artist: &Artist) -> Vec<VideoCandidate> {
    let Some(items) = body.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let external_id = item.get("id")?.get("videoId")?.as_str()?.to_string();
            let snippet = item.get("snippet")?;
            let title = snippet.get("title")?.as_str()?.to_string();
            let published_at = snippet
                .get("publishedAt")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc));

            Some(VideoCandidate {
                source: SourceId::new("youtube"),
                external_id,
                title: title.clone(),
                artist_id: artist.id,
                duration_secs: None,
                published_at,
                score: title_score(&title, &artist.name),
            })
        })
        .collect()
}

/// Keyword search returns plenty of near-misses; candidates whose title
/// carries the artist name score higher so the dedup tie-break can prefer
/// them.
fn title_score(title: &str, artist_name: &str) -> f32 {
    if title.to_lowercase().contains(&artist_name.to_lowercase()) {
        0.9
    } else {
        0.5
    }
}
