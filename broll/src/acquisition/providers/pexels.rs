//! Pexels photos.

use async_trait::async_trait;
use serde::Deserialize;

use super::{ProviderEndpoint, ProviderError, SearchProvider, fetch_json, require_key};
use crate::acquisition::source::Source;

pub struct PexelsProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PexelsProvider {
    pub fn new(client: reqwest::Client, endpoint: ProviderEndpoint) -> Self {
        Self {
            base_url: endpoint.resolve_base_url(Source::Pexels),
            api_key: endpoint.api_key,
            client,
        }
    }
}

#[async_trait]
impl SearchProvider for PexelsProvider {
    fn source(&self) -> Source {
        Source::Pexels
    }

    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError> {
        let key = require_key(Source::Pexels, self.api_key.as_deref())?;
        let request = self
            .client
            .get(format!("{}/search", self.base_url))
            .header("Authorization", key)
            .query(&[("query", query), ("per_page", "1")]);

        let response: PexelsSearchResponse = fetch_json(request).await?;
        Ok(response.photos.into_iter().next().map(|p| p.src.large))
    }
}

#[derive(Debug, Deserialize)]
struct PexelsSearchResponse {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    src: PexelsPhotoSrc,
}

#[derive(Debug, Deserialize)]
struct PexelsPhotoSrc {
    large: String,
}
