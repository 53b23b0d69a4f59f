//! Media cache repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::MediaCacheEntry;
use crate::database::retry::retry_on_sqlite_busy;

/// Media cache repository trait.
#[async_trait]
pub trait MediaCacheRepository: Send + Sync {
    /// Best unexpired entry for a normalized query: highest quality, then most used.
    async fn find_fresh(&self, query: &str, now_ms: i64) -> Result<Option<MediaCacheEntry>>;
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<MediaCacheEntry>>;
    /// Increment `use_count` and stamp `last_used_at`.
    async fn record_use(&self, id: &str, now_ms: i64) -> Result<()>;
    /// Insert unless the content hash is already stored; returns the stored row either way.
    async fn insert_or_get(&self, entry: &MediaCacheEntry) -> Result<MediaCacheEntry>;
    /// Delete entries whose expiry is not after `now_ms`.
    async fn delete_expired(&self, now_ms: i64) -> Result<u64>;
    async fn count(&self) -> Result<i64>;
}

/// SQLx implementation of MediaCacheRepository.
pub struct SqlxMediaCacheRepository {
    pool: SqlitePool,
}

impl SqlxMediaCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaCacheRepository for SqlxMediaCacheRepository {
    async fn find_fresh(&self, query: &str, now_ms: i64) -> Result<Option<MediaCacheEntry>> {
        let entry = sqlx::query_as::<_, MediaCacheEntry>(
            r#"
            SELECT * FROM media_cache
            WHERE query = ? AND expires_at > ?
            ORDER BY quality_score DESC, use_count DESC
            LIMIT 1
            "#,
        )
        .bind(query)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<MediaCacheEntry>> {
        let entry =
            sqlx::query_as::<_, MediaCacheEntry>("SELECT * FROM media_cache WHERE content_hash = ?")
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(entry)
    }

    async fn record_use(&self, id: &str, now_ms: i64) -> Result<()> {
        retry_on_sqlite_busy("record_cache_use", || async {
            sqlx::query(
                "UPDATE media_cache SET use_count = use_count + 1, last_used_at = ? WHERE id = ?",
            )
            .bind(now_ms)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn insert_or_get(&self, entry: &MediaCacheEntry) -> Result<MediaCacheEntry> {
        retry_on_sqlite_busy("insert_cache_entry", || async {
            sqlx::query(
                r#"
                INSERT INTO media_cache (
                    id, query, source, source_url, local_path, content_hash, media_kind,
                    resolution, file_size, quality_score, use_count, created_at,
                    last_used_at, expires_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(content_hash) DO NOTHING
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.query)
            .bind(&entry.source)
            .bind(&entry.source_url)
            .bind(&entry.local_path)
            .bind(&entry.content_hash)
            .bind(&entry.media_kind)
            .bind(&entry.resolution)
            .bind(entry.file_size)
            .bind(entry.quality_score)
            .bind(entry.use_count)
            .bind(entry.created_at)
            .bind(entry.last_used_at)
            .bind(entry.expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        self.find_by_hash(&entry.content_hash)
            .await?
            .ok_or_else(|| crate::Error::not_found("MediaCacheEntry", &entry.content_hash))
    }

    async fn delete_expired(&self, now_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM media_cache WHERE expires_at <= ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
