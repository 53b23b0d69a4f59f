//! Content-addressed media cache.
//!
//! Entries are keyed by normalized query for lookup and unique by content
//! hash for storage. Expired rows stay readable in the table until an
//! explicit [`ContentCache::sweep_expired`]; lookups simply ignore them.

pub mod store;

pub use store::{AssetStore, StoredAsset};

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::Result;
use crate::database::models::{MediaCacheEntry, NewMediaCacheEntry};
use crate::database::repositories::MediaCacheRepository;
use crate::database::time::{duration_to_ms, now_ms};

/// Default freshness window for new entries.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Quality score given to entries inserted without one.
pub const DEFAULT_QUALITY_SCORE: i64 = 5;

/// Lower-case the query and collapse every whitespace run to one space.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub struct ContentCache {
    repo: Arc<dyn MediaCacheRepository>,
    retention: Duration,
    default_quality: i64,
}

impl ContentCache {
    pub fn new(repo: Arc<dyn MediaCacheRepository>) -> Self {
        Self {
            repo,
            retention: DEFAULT_RETENTION,
            default_quality: DEFAULT_QUALITY_SCORE,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_default_quality(mut self, quality: i64) -> Self {
        self.default_quality = quality;
        self
    }

    /// Best fresh entry for `query`, with its usage bumped.
    pub async fn lookup(&self, query: &str) -> Result<Option<MediaCacheEntry>> {
        let normalized = normalize_query(query);
        let now = now_ms();

        let Some(mut entry) = self.repo.find_fresh(&normalized, now).await? else {
            debug!(query = %normalized, "Cache miss");
            return Ok(None);
        };

        self.repo.record_use(&entry.id, now).await?;
        entry.use_count += 1;
        entry.last_used_at = Some(now);

        debug!(
            query = %normalized,
            source = %entry.source,
            content_hash = %entry.content_hash,
            use_count = entry.use_count,
            "Cache hit"
        );
        Ok(Some(entry))
    }

    /// Store an entry, or return the existing one if its content hash is known.
    pub async fn insert(&self, new: NewMediaCacheEntry) -> Result<MediaCacheEntry> {
        let now = now_ms();
        let entry = MediaCacheEntry {
            id: uuid::Uuid::new_v4().to_string(),
            query: normalize_query(&new.query),
            source: new.source,
            source_url: new.source_url,
            local_path: new.local_path,
            content_hash: new.content_hash,
            media_kind: new.kind.as_str().to_string(),
            resolution: new.resolution,
            file_size: new.file_size,
            quality_score: new.quality_score.unwrap_or(self.default_quality),
            use_count: 0,
            created_at: now,
            last_used_at: None,
            expires_at: now.saturating_add(duration_to_ms(self.retention)),
        };

        let stored = self.repo.insert_or_get(&entry).await?;
        if stored.id != entry.id {
            debug!(
                content_hash = %stored.content_hash,
                existing_query = %stored.query,
                "Content already cached, reusing existing entry"
            );
        }
        Ok(stored)
    }

    /// Delete every expired entry. Returns the number removed.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let removed = self.repo.delete_expired(now_ms()).await?;
        if removed > 0 {
            info!("Swept {} expired cache entries", removed);
        }
        Ok(removed)
    }
}
