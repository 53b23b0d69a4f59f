//! Render job repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::{Error, Result};
use crate::database::models::{ErrorLogEntry, RenderJob, RenderJobStatus};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;

/// Render job repository trait.
#[async_trait]
pub trait RenderJobRepository: Send + Sync {
    async fn create_job(&self, job: &RenderJob) -> Result<()>;
    async fn get_job(&self, id: &str) -> Result<RenderJob>;
    async fn list_recent_jobs(&self, limit: i64) -> Result<Vec<RenderJob>>;
    /// Move to `status`, rejecting transitions the lifecycle does not allow.
    async fn update_status(
        &self,
        id: &str,
        status: RenderJobStatus,
        current_step: Option<&str>,
    ) -> Result<()>;
    async fn update_progress(&self, id: &str, total: i64, completed: i64, failed: i64)
    -> Result<()>;
    async fn append_error(&self, id: &str, entry: &ErrorLogEntry) -> Result<()>;
    async fn set_output_path(&self, id: &str, output_path: &str) -> Result<()>;
}

/// SQLx implementation of RenderJobRepository.
pub struct SqlxRenderJobRepository {
    pool: SqlitePool,
}

impl SqlxRenderJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RenderJobRepository for SqlxRenderJobRepository {
    async fn create_job(&self, job: &RenderJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO render_job (
                id, name, mode, status, current_step, total_segments, completed_segments,
                failed_segments, output_path, error_log, started_at, updated_at, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.name)
        .bind(&job.mode)
        .bind(&job.status)
        .bind(&job.current_step)
        .bind(job.total_segments)
        .bind(job.completed_segments)
        .bind(job.failed_segments)
        .bind(&job.output_path)
        .bind(&job.error_log)
        .bind(job.started_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<RenderJob> {
        sqlx::query_as::<_, RenderJob>("SELECT * FROM render_job WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("RenderJob", id))
    }

    async fn list_recent_jobs(&self, limit: i64) -> Result<Vec<RenderJob>> {
        let jobs = sqlx::query_as::<_, RenderJob>(
            "SELECT * FROM render_job ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn update_status(
        &self,
        id: &str,
        status: RenderJobStatus,
        current_step: Option<&str>,
    ) -> Result<()> {
        let job = self.get_job(id).await?;
        let current = job.status().ok_or_else(|| {
            Error::validation(format!("render job {} has unknown status {}", id, job.status))
        })?;
        if !current.can_transition_to(status) {
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: status.to_string(),
            });
        }

        retry_on_sqlite_busy("update_render_job_status", || async {
            let now = now_ms();
            let completed_at = status.is_terminal().then_some(now);
            sqlx::query(
                r#"
                UPDATE render_job
                SET status = ?, current_step = COALESCE(?, current_step), updated_at = ?,
                    completed_at = COALESCE(?, completed_at)
                WHERE id = ?
                "#,
            )
            .bind(status.as_str())
            .bind(current_step)
            .bind(now)
            .bind(completed_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn update_progress(
        &self,
        id: &str,
        total: i64,
        completed: i64,
        failed: i64,
    ) -> Result<()> {
        retry_on_sqlite_busy("update_render_job_progress", || async {
            sqlx::query(
                r#"
                UPDATE render_job
                SET total_segments = ?, completed_segments = ?, failed_segments = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(total)
            .bind(completed)
            .bind(failed)
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn append_error(&self, id: &str, entry: &ErrorLogEntry) -> Result<()> {
        let entry_json = serde_json::to_string(entry)?;
        retry_on_sqlite_busy("append_render_job_error", || async {
            sqlx::query(
                r#"
                UPDATE render_job
                SET error_log = json_insert(error_log, '$[#]', json(?)), updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&entry_json)
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn set_output_path(&self, id: &str, output_path: &str) -> Result<()> {
        sqlx::query("UPDATE render_job SET output_path = ?, updated_at = ? WHERE id = ?")
            .bind(output_path)
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
