//! Media search providers.
//!
//! Every [`Source`] has one provider implementing [`SearchProvider`]. The
//! orchestrator only ever sees "a URL, nothing, or a failure"; each provider
//! owns its own request shape and response schema.

pub mod giphy;
pub mod nasa;
pub mod pexels;
pub mod pixabay;
pub mod unsplash;

pub use giphy::GiphyProvider;
pub use nasa::NasaProvider;
pub use pexels::PexelsProvider;
pub use pixabay::PixabayProvider;
pub use unsplash::UnsplashProvider;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::source::Source;

/// Transient failure of a single provider call.
///
/// These are retried by the executor and recorded as telemetry; they never
/// leave the acquisition layer.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{provider} requires {env_var}")]
    MissingCredential {
        provider: Source,
        env_var: &'static str,
    },
}

/// Uniform search capability implemented by every provider.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn source(&self) -> Source;

    /// One search request. `Ok(None)` means the provider answered with no results.
    async fn search(&self, query: &str) -> Result<Option<String>, ProviderError>;
}

/// Where a provider lives and how it authenticates.
#[derive(Debug, Clone, Default)]
pub struct ProviderEndpoint {
    /// Overrides the registry's default base URL.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl ProviderEndpoint {
    pub(crate) fn resolve_base_url(&self, source: Source) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(source.info().default_base_url)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Returns the configured credential, or `MissingCredential` for keyed sources.
pub(crate) fn require_key(source: Source, key: Option<&str>) -> Result<&str, ProviderError> {
    match key {
        Some(k) if !k.is_empty() => Ok(k),
        _ => Err(ProviderError::MissingCredential {
            provider: source,
            env_var: source.info().credential_env.unwrap_or("API_KEY"),
        }),
    }
}

/// Send a request and decode a JSON body, mapping non-2xx to `Status`.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: body.chars().take(512).collect(),
        });
    }

    serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))
}

/// Table of providers keyed by source.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<Source, Arc<dyn SearchProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registry with the HTTP provider for every known source.
    pub fn with_defaults(
        client: &reqwest::Client,
        endpoints: &HashMap<Source, ProviderEndpoint>,
    ) -> Self {
        let endpoint = |source: Source| endpoints.get(&source).cloned().unwrap_or_default();

        let mut registry = Self::new();
        registry.register(Arc::new(NasaProvider::new(
            client.clone(),
            endpoint(Source::Nasa),
        )));
        registry.register(Arc::new(PixabayProvider::new(
            client.clone(),
            endpoint(Source::Pixabay),
        )));
        registry.register(Arc::new(PexelsProvider::new(
            client.clone(),
            endpoint(Source::Pexels),
        )));
        registry.register(Arc::new(UnsplashProvider::new(
            client.clone(),
            endpoint(Source::Unsplash),
        )));
        registry.register(Arc::new(GiphyProvider::new(
            client.clone(),
            endpoint(Source::Giphy),
        )));
        registry
    }

    /// Register a provider, replacing any previous one for the same source.
    pub fn register(&mut self, provider: Arc<dyn SearchProvider>) {
        self.providers.insert(provider.source(), provider);
    }

    pub fn get(&self, source: Source) -> Option<Arc<dyn SearchProvider>> {
        self.providers.get(&source).cloned()
    }

    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.providers.keys().copied().collect();
        sources.sort();
        sources
    }
}
