//! Giphy animated GIFs.

use async_trait::async_trait;
use serde::Deserialize;

use super::{ProviderEndpoint, ProviderError, SearchProvider, fetch_json, require_key};
use crate::acquisition::source::Source;

pub struct GiphyProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GiphyProvider {
    pub fn new(client: reqwest::Client, endpoint: ProviderEndpoint) -> Self {
        Self {
            base_url: endpoint.resolve_base_url(Source::Giphy),
            api_key: endpoint.api_key,
            client,
        }
    }
}

#[async_trait]
impl SearchProvider for GiphyProvider {
    fn source(&self) -> Source {
        Source::Giphy
    }

    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError> {
        let key = require_key(Source::Giphy, self.api_key.as_deref())?;
        let request = self
            .client
            .get(format!("{}/gifs/search", self.base_url))
            .query(&[("q", query), ("api_key", key), ("limit", "1")]);

        let response: GiphySearchResponse = fetch_json(request).await?;
        Ok(response
            .data
            .into_iter()
            .next()
            .and_then(|gif| gif.images.original.url))
    }
}

#[derive(Debug, Deserialize)]
struct GiphySearchResponse {
    #[serde(default)]
    data: Vec<GiphyGif>,
}

#[derive(Debug, Deserialize)]
struct GiphyGif {
    images: GiphyImages,
}

#[derive(Debug, Deserialize)]
struct GiphyImages {
    original: GiphyImage,
}

#[derive(Debug, Deserialize)]
struct GiphyImage {
    url: Option<String>,
}
