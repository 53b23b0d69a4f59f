//! Provider call log repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{ApiCallRecord, CallStats, NewApiCall};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;

/// Call log repository trait.
#[async_trait]
pub trait ApiCallRepository: Send + Sync {
    /// Append one call attempt, stamped with the current time.
    async fn record(&self, call: &NewApiCall) -> Result<()>;
    /// Aggregate for `source` over rows with `created_at > since_ms`.
    async fn stats_since(&self, source: &str, since_ms: i64) -> Result<CallStats>;
    async fn list_since(&self, source: &str, since_ms: i64) -> Result<Vec<ApiCallRecord>>;
    /// Delete rows created before `cutoff_ms`.
    async fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64>;
}

/// SQLx implementation of ApiCallRepository.
pub struct SqlxApiCallRepository {
    pool: SqlitePool,
}

impl SqlxApiCallRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiCallRepository for SqlxApiCallRepository {
    async fn record(&self, call: &NewApiCall) -> Result<()> {
        retry_on_sqlite_busy("record_api_call", || async {
            sqlx::query(
                r#"
                INSERT INTO api_call (source, query, success, response_time_ms, error_message, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&call.source)
            .bind(&call.query)
            .bind(call.success)
            .bind(call.response_time_ms)
            .bind(&call.error_message)
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn stats_since(&self, source: &str, since_ms: i64) -> Result<CallStats> {
        let stats = sqlx::query_as::<_, CallStats>(
            r#"
            SELECT
                COUNT(*) AS total_calls,
                COALESCE(SUM(CASE WHEN success THEN 1 ELSE 0 END), 0) AS successful_calls,
                AVG(response_time_ms) AS avg_response_time_ms
            FROM api_call
            WHERE source = ? AND created_at > ?
            "#,
        )
        .bind(source)
        .bind(since_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn list_since(&self, source: &str, since_ms: i64) -> Result<Vec<ApiCallRecord>> {
        let records = sqlx::query_as::<_, ApiCallRecord>(
            "SELECT * FROM api_call WHERE source = ? AND created_at > ? ORDER BY id",
        )
        .bind(source)
        .bind(since_ms)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM api_call WHERE created_at < ?")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
