//! NASA Image and Video Library.
//!
//! Open API, no credential. The first link of the first item is the
//! asset preview.

use async_trait::async_trait;
use serde::Deserialize;

use super::{ProviderEndpoint, ProviderError, SearchProvider, fetch_json};
use crate::acquisition::source::Source;

pub struct NasaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl NasaProvider {
    pub fn new(client: reqwest::Client, endpoint: ProviderEndpoint) -> Self {
        Self {
            base_url: endpoint.resolve_base_url(Source::Nasa),
            client,
        }
    }
}

#[async_trait]
impl SearchProvider for NasaProvider {
    fn source(&self) -> Source {
        Source::Nasa
    }

    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError> {
        let request = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("media_type", "image,video")]);

        let response: NasaSearchResponse = fetch_json(request).await?;
        Ok(response
            .collection
            .items
            .into_iter()
            .next()
            .and_then(|item| item.links.into_iter().next())
            .map(|link| link.href))
    }
}

#[derive(Debug, Deserialize)]
struct NasaSearchResponse {
    collection: NasaCollection,
}

#[derive(Debug, Deserialize)]
struct NasaCollection {
    #[serde(default)]
    items: Vec<NasaItem>,
}

#[derive(Debug, Deserialize)]
struct NasaItem {
    #[serde(default)]
    links: Vec<NasaLink>,
}

#[derive(Debug, Deserialize)]
struct NasaLink {
    href: String,
}
