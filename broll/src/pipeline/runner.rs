//! Bounded worker pool over segments.
//!
//! Pool size is fixed once per run from the resource governor. Each segment
//! runs acquisition, download and encode sequentially; a failing segment
//! never cancels its siblings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::fetcher::AssetFetcher;
use super::segment::Segment;
use super::tracker::JobTracker;
use crate::acquisition::{AcquisitionOrchestrator, FoundAsset, SearchOutcome};
use crate::cache::StoredAsset;
use crate::database::models::{MediaKind, NewMediaCacheEntry};
use crate::encoding::{ClipEncoder, ClipRequest};
use crate::resource::{DiskSpaceStatus, ResourceGovernor, gb_to_bytes};
use crate::{Error, Result};

/// Knobs for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub min_workers: usize,
    pub max_workers: usize,
    /// Free space demanded on the output disk before starting.
    pub required_disk_gb: f64,
    /// Segments longer than this ask for video-capable sources first.
    pub prefer_video_min_secs: f64,
    pub output_dir: PathBuf,
    /// Encoded in place of a segment whose own asset could not be used.
    pub fallback_asset: Option<PathBuf>,
    /// Preset name recorded on the render job.
    pub mode: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 4,
            required_disk_gb: 5.0,
            prefer_video_min_secs: 15.0,
            output_dir: PathBuf::from("output"),
            fallback_asset: None,
            mode: "balanced".to_string(),
        }
    }
}

/// How a segment ended up with (or without) a clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SegmentOutcome {
    /// Located by a provider, downloaded and encoded.
    Acquired { source: String },
    /// Served from the content cache.
    CacheHit { source: String },
    /// The placeholder asset was encoded instead.
    Fallback { reason: String },
    /// No clip could be produced.
    Failed { reason: String },
}

impl SegmentOutcome {
    pub fn has_clip(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub index: usize,
    pub query: String,
    pub outcome: SegmentOutcome,
    pub clip: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub job_id: String,
    pub workers: usize,
    /// Ordered by segment index.
    pub segments: Vec<SegmentReport>,
}

impl RunReport {
    pub fn count(&self, pred: impl Fn(&SegmentOutcome) -> bool) -> usize {
        self.segments.iter().filter(|s| pred(&s.outcome)).count()
    }

    pub fn clips(&self) -> Vec<&Path> {
        self.segments
            .iter()
            .filter_map(|s| s.clip.as_deref())
            .collect()
    }
}

/// Everything a segment task needs, shared across the pool.
struct SegmentWorker {
    orchestrator: Arc<AcquisitionOrchestrator>,
    fetcher: Arc<dyn AssetFetcher>,
    encoder: Arc<dyn ClipEncoder>,
    settings: PipelineSettings,
}

pub struct SegmentPipeline {
    worker: Arc<SegmentWorker>,
    governor: Arc<ResourceGovernor>,
    tracker: Arc<dyn JobTracker>,
}

impl SegmentPipeline {
    pub fn new(
        orchestrator: Arc<AcquisitionOrchestrator>,
        fetcher: Arc<dyn AssetFetcher>,
        encoder: Arc<dyn ClipEncoder>,
        governor: Arc<ResourceGovernor>,
        tracker: Arc<dyn JobTracker>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            worker: Arc::new(SegmentWorker {
                orchestrator,
                fetcher,
                encoder,
                settings,
            }),
            governor,
            tracker,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.worker.settings
    }

    /// Process every segment and report per-segment outcomes.
    ///
    /// Fails on insufficient disk space, on any store or filesystem error
    /// once the job has started, or after all segments have finished when at
    /// least one segment task hit a hard error or panicked. The render job is
    /// marked failed in every case.
    pub async fn run(&self, job_name: &str, segments: Vec<Segment>) -> Result<RunReport> {
        let settings = &self.worker.settings;
        let job_id = self
            .tracker
            .start(job_name, &settings.mode, segments.len())
            .await?;

        match self.run_job(&job_id, segments).await {
            Ok(report) => Ok(report),
            Err(err) => {
                error!(job_id = %job_id, error = %err, "Segment pipeline failed");
                if let Err(e) = self.tracker.fail(&job_id, &err.to_string()).await {
                    warn!(job_id = %job_id, error = %e, "Failed to mark job failed");
                }
                Err(err)
            }
        }
    }

    async fn run_job(&self, job_id: &str, segments: Vec<Segment>) -> Result<RunReport> {
        let settings = &self.worker.settings;
        let total = segments.len();

        let snapshot = self.governor.snapshot(&settings.output_dir);
        info!(job_id = %job_id, snapshot = ?snapshot, "Starting segment pipeline");

        let required = gb_to_bytes(settings.required_disk_gb);
        if let DiskSpaceStatus::InsufficientSpace {
            available_bytes,
            required_bytes,
        } = self.governor.check_disk_space(&settings.output_dir, required)
        {
            return Err(Error::InsufficientDiskSpace {
                available_bytes,
                required_bytes,
            });
        }

        tokio::fs::create_dir_all(&settings.output_dir).await?;

        // A zero-sized pool would never hand out a permit.
        let workers = self
            .governor
            .optimal_workers(settings.min_workers, settings.max_workers)
            .max(1);
        self.tracker.step(job_id, "waiting for resources").await?;
        self.governor.wait_for_resources().await;
        self.tracker.step(job_id, "acquiring media").await?;

        let mut progress = Progress::new(total);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut set: JoinSet<(usize, Result<SegmentReport>)> = JoinSet::new();

        for (index, segment) in segments.into_iter().enumerate() {
            // Taking the permit here starts segments in order.
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::Other(format!("worker pool closed: {e}")))?;
            let worker = self.worker.clone();
            set.spawn(async move {
                let _permit = permit;
                (index, worker.process(index, segment).await)
            });

            while let Some(joined) = set.try_join_next() {
                self.collect(job_id, joined, &mut progress).await;
            }
        }
        while let Some(joined) = set.join_next().await {
            self.collect(job_id, joined, &mut progress).await;
        }

        let Progress {
            mut reports,
            completed,
            failed,
            fatal,
            ..
        } = progress;
        reports.sort_by_key(|r| r.index);

        if !fatal.is_empty() {
            return Err(Error::Other(format!(
                "{} of {} segments hit an unrecoverable error: {}",
                fatal.len(),
                total,
                fatal.join("; ")
            )));
        }

        let output_dir = settings.output_dir.to_string_lossy();
        self.tracker.complete(job_id, Some(&output_dir)).await?;
        info!(
            job_id = %job_id,
            workers,
            completed,
            failed,
            "Segment pipeline finished"
        );

        Ok(RunReport {
            job_id: job_id.to_string(),
            workers,
            segments: reports,
        })
    }

    async fn collect(
        &self,
        job_id: &str,
        joined: std::result::Result<(usize, Result<SegmentReport>), tokio::task::JoinError>,
        progress: &mut Progress,
    ) {
        match joined {
            Ok((_, Ok(report))) => {
                match &report.outcome {
                    SegmentOutcome::Fallback { reason } | SegmentOutcome::Failed { reason } => {
                        let note = format!("segment {}: {}", report.index, reason);
                        if let Err(e) = self.tracker.note_error(job_id, &note).await {
                            warn!(job_id = %job_id, error = %e, "Failed to record segment error");
                        }
                    }
                    _ => {}
                }
                if report.outcome.has_clip() {
                    progress.completed += 1;
                } else {
                    progress.failed += 1;
                }
                progress.reports.push(report);
            }
            Ok((index, Err(e))) => {
                error!(job_id = %job_id, index, error = %e, "Segment failed");
                progress.failed += 1;
                progress.fatal.push(format!("segment {index}: {e}"));
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Segment task panicked");
                progress.failed += 1;
                progress.fatal.push(format!("segment task panicked: {e}"));
            }
        }

        if let Err(e) = self
            .tracker
            .progress(job_id, progress.total, progress.completed, progress.failed)
            .await
        {
            warn!(job_id = %job_id, error = %e, "Failed to update job progress");
        }
    }
}

struct Progress {
    total: usize,
    completed: usize,
    failed: usize,
    reports: Vec<SegmentReport>,
    fatal: Vec<String>,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            reports: Vec::with_capacity(total),
            fatal: Vec::new(),
        }
    }
}

impl SegmentWorker {
    async fn process(&self, index: usize, segment: Segment) -> Result<SegmentReport> {
        let query = segment.text.trim().to_string();
        let prefer_video = segment.prefers_video(self.settings.prefer_video_min_secs);
        let output = self.settings.output_dir.join(format!("clip_{index:04}.mp4"));
        let duration = segment.duration();

        debug!(index, query = %query, prefer_video, "Processing segment");

        let outcome = match self.orchestrator.search(&query, prefer_video).await? {
            SearchOutcome::NotFound => {
                self.fallback(&output, duration, "no asset found".to_string())
                    .await
            }
            SearchOutcome::Found(FoundAsset::Cached(entry)) => {
                let path = PathBuf::from(&entry.local_path);
                let local = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    Ok((path, entry.kind()))
                } else {
                    warn!(
                        index,
                        path = %entry.local_path,
                        "Cached file missing, downloading again"
                    );
                    self.download(&query, &entry.source, &entry.source_url)
                        .await
                        .map(|stored| (stored.path, stored.kind))
                };
                match local {
                    Ok((path, kind)) => {
                        self.encode_or_fallback(&path, kind, &output, duration, || {
                            SegmentOutcome::CacheHit {
                                source: entry.source.clone(),
                            }
                        })
                        .await
                    }
                    Err(DownloadError::Fetch(e)) => {
                        self.fallback(&output, duration, format!("download failed: {e}"))
                            .await
                    }
                    Err(DownloadError::Store(e)) => return Err(e),
                }
            }
            SearchOutcome::Found(FoundAsset::Remote { url, source }) => {
                match self.download(&query, source.as_str(), &url).await {
                    Ok(stored) => {
                        self.encode_or_fallback(&stored.path, stored.kind, &output, duration, || {
                            SegmentOutcome::Acquired {
                                source: source.as_str().to_string(),
                            }
                        })
                        .await
                    }
                    Err(DownloadError::Fetch(e)) => {
                        self.fallback(&output, duration, format!("download failed: {e}"))
                            .await
                    }
                    Err(DownloadError::Store(e)) => return Err(e),
                }
            }
        };

        let clip = outcome.has_clip().then_some(output);
        Ok(SegmentReport {
            index,
            query,
            outcome,
            clip,
        })
    }

    /// Fetch `url` and record it in the cache.
    async fn download(
        &self,
        query: &str,
        source: &str,
        url: &str,
    ) -> std::result::Result<StoredAsset, DownloadError> {
        let stored = self.fetcher.fetch(url).await.map_err(DownloadError::Fetch)?;
        self.orchestrator
            .cache()
            .insert(NewMediaCacheEntry {
                query: query.to_string(),
                source: source.to_string(),
                source_url: url.to_string(),
                local_path: stored.path.to_string_lossy().into_owned(),
                content_hash: stored.content_hash.clone(),
                kind: stored.kind,
                resolution: None,
                file_size: stored.size as i64,
                quality_score: None,
            })
            .await
            .map_err(DownloadError::Store)?;
        Ok(stored)
    }

    async fn encode_or_fallback(
        &self,
        input: &Path,
        kind: MediaKind,
        output: &Path,
        duration: f64,
        on_success: impl FnOnce() -> SegmentOutcome,
    ) -> SegmentOutcome {
        match self.encode(input, kind, output, duration).await {
            Ok(()) => on_success(),
            Err(e) => {
                self.fallback(output, duration, format!("encode failed: {e}"))
                    .await
            }
        }
    }

    async fn encode(&self, input: &Path, kind: MediaKind, output: &Path, duration: f64) -> Result<()> {
        let request = ClipRequest {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            kind,
            duration,
        };
        self.encoder.encode(&request).await
    }

    async fn fallback(&self, output: &Path, duration: f64, reason: String) -> SegmentOutcome {
        let Some(placeholder) = &self.settings.fallback_asset else {
            warn!(output = %output.display(), reason = %reason, "No fallback asset configured");
            return SegmentOutcome::Failed { reason };
        };

        warn!(output = %output.display(), reason = %reason, "Using fallback asset");
        let kind = MediaKind::infer(&placeholder.to_string_lossy());
        match self.encode(placeholder, kind, output, duration).await {
            Ok(()) => SegmentOutcome::Fallback { reason },
            Err(e) => SegmentOutcome::Failed {
                reason: format!("{reason}; fallback encode failed: {e}"),
            },
        }
    }
}

/// A download problem is a segment-level failure; a cache write problem is
/// a store failure and ends the segment with an error.
enum DownloadError {
    Fetch(Error),
    Store(Error),
}
