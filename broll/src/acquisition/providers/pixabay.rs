//! Pixabay photos and videos.

use async_trait::async_trait;
use serde::Deserialize;

use super::{ProviderEndpoint, ProviderError, SearchProvider, fetch_json, require_key};
use crate::acquisition::source::Source;

pub struct PixabayProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PixabayProvider {
    pub fn new(client: reqwest::Client, endpoint: ProviderEndpoint) -> Self {
        Self {
            base_url: endpoint.resolve_base_url(Source::Pixabay),
            api_key: endpoint.api_key,
            client,
        }
    }
}

#[async_trait]
impl SearchProvider for PixabayProvider {
    fn source(&self) -> Source {
        Source::Pixabay
    }

    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError> {
        let key = require_key(Source::Pixabay, self.api_key.as_deref())?;
        let request = self.client.get(format!("{}/", self.base_url)).query(&[
            ("key", key),
            ("q", query),
            ("image_type", "photo"),
            ("video_type", "all"),
        ]);

        let response: PixabayResponse = fetch_json(request).await?;
        Ok(response.hits.into_iter().next().and_then(|hit| {
            hit.large_image_url
                .filter(|u| !u.is_empty())
                .or_else(|| hit.videos.and_then(|v| v.medium).map(|m| m.url))
        }))
    }
}

#[derive(Debug, Deserialize)]
struct PixabayResponse {
    #[serde(default)]
    hits: Vec<PixabayHit>,
}

#[derive(Debug, Deserialize)]
struct PixabayHit {
    #[serde(rename = "largeImageURL")]
    large_image_url: Option<String>,
    videos: Option<PixabayVideos>,
}

#[derive(Debug, Deserialize)]
struct PixabayVideos {
    medium: Option<PixabayVideo>,
}

#[derive(Debug, Deserialize)]
struct PixabayVideo {
    url: String,
}
