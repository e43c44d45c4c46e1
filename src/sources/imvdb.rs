//! IMVDb source adapter.
//!
//! IMVDb is music-video-specific, so its metadata is treated as higher
//! confidence than keyword search results (see the default source
//! priority in `settings`).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::core::error::SourceError;
use crate::model::{Artist, SourceId, VideoCandidate};
use crate::sources::VideoSource;

const SEARCH_URL: &str = "https://imvdb.com/api/v1/search/videos";

pub struct ImvdbSource {
    client: reqwest::Client,
    app_key: String,
}

impl ImvdbSource {
    pub fn new(app_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            app_key,
        }
    }
}

#[async_trait]
impl VideoSource for ImvdbSource {
    fn id(&self) -> SourceId {
        SourceId::new("imvdb")
    }

    fn display_name(&self) -> &str {
        "IMVDb"
    }

    async fn search(
        &self,
        artist: &Artist,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<VideoCandidate>, SourceError> {
        // The search endpoint has no published-after filter; dedup discards
        // what is already known.
        let response = self
            .client
            .get(SEARCH_URL)
            .header("IMVDB-APP-KEY", &self.app_key)
            .query(&[("q", artist.name.as_str()), ("per_page", "50")])
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(format!("imvdb request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited(format!("imvdb returned {}", status)));
        }
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!("imvdb returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Unavailable(format!("imvdb sent bad JSON: {}", e)))?;

        Ok(parse_search_response(&body, artist))
    }
}

fn parse_search_response(body: &Value, artist: &Artist) -> Vec<VideoCandidate> {
    let Some(results) = body.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|entry| {
            let external_id = match entry.get("id")? {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return None,
            };
            let song_title = entry.get("song_title")?.as_str()?;
            let credited = entry
                .get("artists")
                .and_then(Value::as_array)
                .map(|artists| {
                    artists
                        .iter()
                        .filter_map(|a| a.get("name").and_then(Value::as_str))
                        .any(|name| name.eq_ignore_ascii_case(&artist.name))
                })
                .unwrap_or(false);
            let published_at = entry
                .get("year")
                .and_then(Value::as_i64)
                .and_then(|year| Utc.with_ymd_and_hms(year as i32, 1, 1, 0, 0, 0).single());

            Some(VideoCandidate {
                source: SourceId::new("imvdb"),
                external_id,
                title: format!("{} - {}", artist.name, song_title),
                artist_id: artist.id,
                duration_secs: entry.get("duration").and_then(Value::as_u64).map(|d| d as u32),
                published_at,
                score: if credited { 0.95 } else { 0.6 },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artist() -> Artist {
        Artist {
            id: 3,
            name: "Röyksopp".to_string(),
            monitored: true,
            discovery_interval_mins: None,
            last_discovery_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn parses_results_with_credit_scoring() {
        let body = json!({
            "results": [
                {
                    "id": 8810,
                    "song_title": "Eple",
                    "year": 2001,
                    "artists": [{"name": "Röyksopp"}]
                },
                {
                    "id": "9911",
                    "song_title": "Cover Version",
                    "artists": [{"name": "Somebody Else"}]
                }
            ]
        });

        let candidates = parse_search_response(&body, &artist());
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].external_id, "8810");
        assert_eq!(candidates[0].title, "Röyksopp - Eple");
        assert!(candidates[0].published_at.is_some());
        assert!(candidates[0].score > candidates[1].score);
        assert_eq!(candidates[1].external_id, "9911");
    }

    #[test]
    fn tolerates_missing_fields() {
        let body = json!({
            "results": [
                {"id": 1},
                {"song_title": "No Id"},
                {"id": 2, "song_title": "Ok"}
            ]
        });
        let candidates = parse_search_response(&body, &artist());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].external_id, "2");
    }
}
