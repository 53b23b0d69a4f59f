//! Acquisition orchestrator: cache, then the first healthy provider that answers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::health::HealthTracker;
use super::providers::ProviderRegistry;
use super::resilience::{CircuitBreakerManager, RetryExecutor};
use super::source::{self, Source};
use crate::Result;
use crate::cache::ContentCache;
use crate::database::models::MediaCacheEntry;

/// Ordering and skip policy.
#[derive(Debug, Clone)]
pub struct AcquisitionPolicy {
    pub default_order: Vec<Source>,
    pub video_order: Vec<Source>,
    /// Sources whose windowed success rate is below this are skipped.
    pub health_floor: f64,
    pub health_window: Duration,
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            default_order: source::default_order(),
            video_order: source::video_order(),
            health_floor: 0.3,
            health_window: Duration::from_secs(30 * 60),
        }
    }
}

impl AcquisitionPolicy {
    pub fn order(&self, prefer_video: bool) -> &[Source] {
        if prefer_video {
            &self.video_order
        } else {
            &self.default_order
        }
    }
}

/// An asset located for a query.
#[derive(Debug, Clone, PartialEq)]
pub enum FoundAsset {
    /// Served from the content cache; usage was already bumped.
    Cached(MediaCacheEntry),
    /// Returned by a provider and not yet downloaded.
    Remote { url: String, source: Source },
}

impl FoundAsset {
    pub fn url(&self) -> &str {
        match self {
            Self::Cached(entry) => &entry.source_url,
            Self::Remote { url, .. } => url,
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            Self::Cached(entry) => &entry.source,
            Self::Remote { source, .. } => source.as_str(),
        }
    }
}

/// Result of a search. Exhausting every provider is `NotFound`, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(FoundAsset),
    NotFound,
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Why a source was passed over.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SkipReason {
    CircuitOpen,
    Unhealthy(f64),
}

/// Shared by every segment worker of one pipeline run.
pub struct AcquisitionOrchestrator {
    cache: Arc<ContentCache>,
    providers: ProviderRegistry,
    breakers: Arc<CircuitBreakerManager>,
    health: HealthTracker,
    executor: RetryExecutor,
    policy: AcquisitionPolicy,
}

impl AcquisitionOrchestrator {
    pub fn new(
        cache: Arc<ContentCache>,
        providers: ProviderRegistry,
        breakers: Arc<CircuitBreakerManager>,
        health: HealthTracker,
        executor: RetryExecutor,
        policy: AcquisitionPolicy,
    ) -> Self {
        Self {
            cache,
            providers,
            breakers,
            health,
            executor,
            policy,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Find an asset for `query`.
    ///
    /// `Err` means a store failure; provider failures only ever lead to the
    /// next source or to `NotFound`.
    pub async fn search(&self, query: &str, prefer_video: bool) -> Result<SearchOutcome> {
        if let Some(entry) = self.cache.lookup(query).await? {
            info!(query = %query, source = %entry.source, "Using cached asset");
            return Ok(SearchOutcome::Found(FoundAsset::Cached(entry)));
        }

        for &source in self.policy.order(prefer_video) {
            let Some(provider) = self.providers.get(source) else {
                debug!(source = %source, "No provider registered, skipping");
                continue;
            };
            if let Some(reason) = self.skip_reason(source).await? {
                debug!(source = %source, reason = ?reason, "Skipping source");
                continue;
            }

            let result = self
                .executor
                .execute(source, query, || provider.search(query))
                .await;

            match result {
                Ok(Some(url)) if !url.is_empty() => {
                    info!(query = %query, source = %source, "Found asset");
                    return Ok(SearchOutcome::Found(FoundAsset::Remote { url, source }));
                }
                Ok(_) => {
                    debug!(query = %query, source = %source, "No results");
                }
                Err(e) => {
                    warn!(query = %query, source = %source, error = %e, "Source exhausted retries");
                }
            }
        }

        info!(query = %query, "No asset found from any source");
        Ok(SearchOutcome::NotFound)
    }

    async fn skip_reason(&self, source: Source) -> Result<Option<SkipReason>> {
        if self.breakers.is_open(source) {
            return Ok(Some(SkipReason::CircuitOpen));
        }
        let health = self
            .health
            .get_health(source, self.policy.health_window)
            .await?;
        if health.success_rate < self.policy.health_floor {
            return Ok(Some(SkipReason::Unhealthy(health.success_rate)));
        }
        Ok(None)
    }
}
