// SPDX-License-Identifier: MIT

//! YouTube live-status check for the lab's channel.
//!
//! The frontend polls this to embed the stream when a seminar is live. The
//! result sits behind a component-owned TTL cache keyed by channel: a live
//! answer is cached briefly so the embed appears promptly after stream end,
//! a negative answer longer to conserve API quota.

use crate::cache::TtlCache;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const HTTP_TIMEOUT: Duration = Duration::from_secs(8);
const LIVE_TTL: Duration = Duration::from_secs(60);
const IDLE_TTL: Duration = Duration::from_secs(300);
const ERROR_TTL: Duration = Duration::from_secs(60);

/// Whether a channel is live, and the video to embed if so.
#[derive(Debug, Clone, Serialize)]
pub struct LiveStatus {
    pub is_live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

impl LiveStatus {
    fn offline() -> Self {
        Self {
            is_live: false,
            video_id: None,
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

/// Checks and caches the lab channel's live status.
pub struct LiveStatusService {
    http: reqwest::Client,
    api_key: Option<String>,
    cache: TtlCache<LiveStatus>,
}

impl LiveStatusService {
    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_key,
            cache: TtlCache::new(),
        }
    }

    /// Check whether a channel is currently live, consulting the cache first.
    pub async fn check_channel(&self, channel_id: &str) -> LiveStatus {
        let cache_key = format!("youtube_live:{channel_id}");

        if let Some(status) = self.cache.get(&cache_key).await {
            return status;
        }

        let Some(ref api_key) = self.api_key else {
            tracing::debug!("No YouTube API key configured; reporting offline");
            let status = LiveStatus::offline();
            self.cache.insert(&cache_key, status.clone(), ERROR_TTL).await;
            return status;
        };

        let (status, ttl) = match self.query_live(channel_id, api_key).await {
            Ok(status) => {
                let ttl = if status.is_live { LIVE_TTL } else { IDLE_TTL };
                (status, ttl)
            }
            Err(e) => {
                tracing::warn!(channel = %channel_id, error = %e, "YouTube live check failed");
                (LiveStatus::offline(), ERROR_TTL)
            }
        };

        self.cache.insert(&cache_key, status.clone(), ttl).await;
        status
    }

    async fn query_live(&self, channel_id: &str, api_key: &str) -> anyhow::Result<LiveStatus> {
        let response = self
            .http
            .get(SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("channelId", channel_id),
                ("eventType", "live"),
                ("type", "video"),
                ("maxResults", "1"),
                ("key", api_key),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: SearchResponse = response.json().await?;
        Ok(status_from_search(body))
    }
}

fn status_from_search(response: SearchResponse) -> LiveStatus {
    match response
        .items
        .into_iter()
        .next()
        .and_then(|item| item.id.video_id)
    {
        Some(video_id) => LiveStatus {
            is_live: true,
            video_id: Some(video_id),
        },
        None => LiveStatus::offline(),
    }
}
