//! Store maintenance: expired cache sweep and call log pruning.
//!
//! Nothing here runs implicitly; lookups never delete. The CLI's
//! `maintenance` command drives a single pass.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::Result;
use crate::cache::ContentCache;
use crate::database::DbPool;
use crate::database::repositories::ApiCallRepository;
use crate::database::time::{ms_before, now_ms};

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Call records older than this are deleted (default: 7 days).
    pub call_log_retention: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            call_log_retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub cache_entries_swept: u64,
    pub call_records_pruned: u64,
    /// Free pages left in the database file, in bytes.
    pub freeable_bytes: i64,
}

pub struct MaintenanceRunner {
    pool: DbPool,
    cache: Arc<ContentCache>,
    calls: Arc<dyn ApiCallRepository>,
    config: MaintenanceConfig,
}

impl MaintenanceRunner {
    pub fn new(
        pool: DbPool,
        cache: Arc<ContentCache>,
        calls: Arc<dyn ApiCallRepository>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            pool,
            cache,
            calls,
            config,
        }
    }

    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        info!("Starting store maintenance");

        let cache_entries_swept = self.cache.sweep_expired().await?;

        let cutoff = ms_before(now_ms(), self.config.call_log_retention);
        let call_records_pruned = self.calls.prune_older_than(cutoff).await?;
        if call_records_pruned > 0 {
            info!("Pruned {} call log records", call_records_pruned);
        }

        sqlx::query("PRAGMA optimize").execute(&self.pool).await?;
        let freeable_bytes = self.freeable_space().await?;
        debug!(freeable_bytes, "Database free space");

        let report = MaintenanceReport {
            cache_entries_swept,
            call_records_pruned,
            freeable_bytes,
        };
        info!(?report, "Store maintenance completed");
        Ok(report)
    }

    async fn freeable_space(&self) -> Result<i64> {
        let (bytes,): (i64,) = sqlx::query_as(
            "SELECT freelist_count * page_size FROM pragma_freelist_count(), pragma_page_size()",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(bytes)
    }
}
