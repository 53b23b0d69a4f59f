//! Unsplash photos.

use async_trait::async_trait;
use serde::Deserialize;

use super::{ProviderEndpoint, ProviderError, SearchProvider, fetch_json, require_key};
use crate::acquisition::source::Source;

pub struct UnsplashProvider {
    client: reqwest::Client,
    base_url: String,
    access_key: Option<String>,
}

impl UnsplashProvider {
    pub fn new(client: reqwest::Client, endpoint: ProviderEndpoint) -> Self {
        Self {
            base_url: endpoint.resolve_base_url(Source::Unsplash),
            access_key: endpoint.api_key,
            client,
        }
    }
}

#[async_trait]
impl SearchProvider for UnsplashProvider {
    fn source(&self) -> Source {
        Source::Unsplash
    }

    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError> {
        let key = require_key(Source::Unsplash, self.access_key.as_deref())?;
        let request = self
            .client
            .get(format!("{}/search/photos", self.base_url))
            .query(&[("query", query), ("per_page", "1"), ("client_id", key)]);

        let response: UnsplashSearchResponse = fetch_json(request).await?;
        Ok(response.results.into_iter().next().map(|p| p.urls.regular))
    }
}

#[derive(Debug, Deserialize)]
struct UnsplashSearchResponse {
    #[serde(default)]
    results: Vec<UnsplashPhoto>,
}

#[derive(Debug, Deserialize)]
struct UnsplashPhoto {
    urls: UnsplashUrls,
}

#[derive(Debug, Deserialize)]
struct UnsplashUrls {
    regular: String,
}
