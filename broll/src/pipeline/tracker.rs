//! Render job status reporting.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::Result;
use crate::database::models::{ErrorLogEntry, RenderJob, RenderJobStatus};
use crate::database::repositories::RenderJobRepository;

/// Status sink the pipeline reports to at phase boundaries.
#[async_trait]
pub trait JobTracker: Send + Sync {
    /// Create a job and move it to processing. Returns the job id.
    async fn start(&self, name: &str, mode: &str, total_segments: usize) -> Result<String>;
    async fn step(&self, job_id: &str, step: &str) -> Result<()>;
    async fn progress(&self, job_id: &str, total: usize, completed: usize, failed: usize)
    -> Result<()>;
    /// Record a non-fatal problem without changing status.
    async fn note_error(&self, job_id: &str, error: &str) -> Result<()>;
    async fn complete(&self, job_id: &str, output_path: Option<&str>) -> Result<()>;
    async fn fail(&self, job_id: &str, error: &str) -> Result<()>;
}

/// Persists job state through a [`RenderJobRepository`].
pub struct RepositoryJobTracker {
    repo: Arc<dyn RenderJobRepository>,
}

impl RepositoryJobTracker {
    pub fn new(repo: Arc<dyn RenderJobRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl JobTracker for RepositoryJobTracker {
    async fn start(&self, name: &str, mode: &str, total_segments: usize) -> Result<String> {
        let mut job = RenderJob::new(name, mode);
        job.total_segments = total_segments as i64;
        self.repo.create_job(&job).await?;
        self.repo
            .update_status(&job.id, RenderJobStatus::Processing, Some("starting"))
            .await?;
        info!(job_id = %job.id, name = %name, mode = %mode, "Render job started");
        Ok(job.id)
    }

    async fn step(&self, job_id: &str, step: &str) -> Result<()> {
        self.repo
            .update_status(job_id, RenderJobStatus::Processing, Some(step))
            .await
    }

    async fn progress(
        &self,
        job_id: &str,
        total: usize,
        completed: usize,
        failed: usize,
    ) -> Result<()> {
        self.repo
            .update_progress(job_id, total as i64, completed as i64, failed as i64)
            .await
    }

    async fn note_error(&self, job_id: &str, error: &str) -> Result<()> {
        self.repo
            .append_error(job_id, &ErrorLogEntry::now(error))
            .await
    }

    async fn complete(&self, job_id: &str, output_path: Option<&str>) -> Result<()> {
        if let Some(path) = output_path {
            self.repo.set_output_path(job_id, path).await?;
        }
        self.repo
            .update_status(job_id, RenderJobStatus::Completed, Some("done"))
            .await?;
        info!(job_id = %job_id, "Render job completed");
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str) -> Result<()> {
        self.repo
            .append_error(job_id, &ErrorLogEntry::now(error))
            .await?;
        self.repo
            .update_status(job_id, RenderJobStatus::Failed, None)
            .await?;
        info!(job_id = %job_id, error = %error, "Render job failed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::SqlxRenderJobRepository;
    use crate::database::test_support::temp_pool;

    #[tokio::test]
    async fn test_lifecycle_through_repository() {
        let (_dir, pool) = temp_pool().await;
        let repo = Arc::new(SqlxRenderJobRepository::new(pool));
        let tracker = RepositoryJobTracker::new(repo.clone());

        let id = tracker.start("episode-1", "balanced", 3).await.unwrap();
        tracker.step(&id, "acquiring").await.unwrap();
        tracker.progress(&id, 3, 2, 1).await.unwrap();
        tracker.note_error(&id, "segment 2 used fallback").await.unwrap();
        tracker.complete(&id, Some("/out/episode-1")).await.unwrap();

        let job = repo.get_job(&id).await.unwrap();
        assert_eq!(job.status(), Some(RenderJobStatus::Completed));
        assert_eq!(job.total_segments, 3);
        assert_eq!(job.completed_segments, 2);
        assert_eq!(job.failed_segments, 1);
        assert_eq!(job.output_path.as_deref(), Some("/out/episode-1"));
        assert_eq!(job.errors().len(), 1);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_fail_records_error() {
        let (_dir, pool) = temp_pool().await;
        let repo = Arc::new(SqlxRenderJobRepository::new(pool));
        let tracker = RepositoryJobTracker::new(repo.clone());

        let id = tracker.start("episode-2", "fast", 1).await.unwrap();
        tracker.fail(&id, "disk full").await.unwrap();

        let job = repo.get_job(&id).await.unwrap();
        assert_eq!(job.status(), Some(RenderJobStatus::Failed));
        assert_eq!(job.errors()[0].error, "disk full");
        assert!(tracker.step(&id, "again").await.is_err());
    }
}
