//! End-to-end segment pipeline runs against a real SQLite store, with
//! scripted providers, fetcher and encoder standing in for the network and
//! ffmpeg.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use broll::acquisition::{
    AcquisitionOrchestrator, AcquisitionPolicy, CircuitBreakerManager, HealthTracker,
    ProviderError, ProviderRegistry, RetryExecutor, RetryPolicy, SearchProvider, Source,
};
use broll::cache::store::extension_from_url;
use broll::cache::{AssetStore, ContentCache, StoredAsset, content_hash};
use broll::database::models::RenderJobStatus;
use broll::database::repositories::{
    ApiCallRepository, RenderJobRepository, SqlxApiCallRepository, SqlxMediaCacheRepository,
    SqlxRenderJobRepository,
};
use broll::database::{DbPool, connect};
use broll::encoding::{ClipEncoder, ClipRequest};
use broll::pipeline::{
    AssetFetcher, PipelineSettings, RepositoryJobTracker, Segment, SegmentOutcome,
    SegmentPipeline,
};
use broll::resource::{DiskSpaceStatus, ResourceGovernor, ThrottleConfig, gb_to_bytes};
use broll::{Error, Result};

/// Answers from a per-query table; unknown queries fail.
struct ScriptedProvider {
    source: Source,
    answers: HashMap<&'static str, &'static str>,
    fallback: Option<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(source: Source, answers: &[(&'static str, &'static str)]) -> Arc<Self> {
        Arc::new(Self {
            source,
            answers: answers.iter().copied().collect(),
            fallback: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn answering_everything(source: Source, url: &'static str) -> Arc<Self> {
        Arc::new(Self {
            source,
            answers: HashMap::new(),
            fallback: Some(url),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for ScriptedProvider {
    fn source(&self) -> Source {
        self.source
    }

    async fn search(&self, query: &str) -> std::result::Result<Option<String>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answers.get(query).copied().or(self.fallback) {
            Some(url) => Ok(Some(url.to_string())),
            None => Err(ProviderError::Status {
                status: 503,
                body: "induced failure".to_string(),
            }),
        }
    }
}

/// Stores the URL text itself as the asset bytes. URLs containing
/// `broken` fail to download.
struct ScriptedFetcher {
    store: AssetStore,
    fetched: Mutex<Vec<String>>,
}

#[async_trait]
impl AssetFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<StoredAsset> {
        self.fetched.lock().push(url.to_string());
        if url.contains("broken") {
            return Err(Error::Other(format!("connection reset fetching {url}")));
        }
        self.store
            .write_bytes(url.as_bytes(), &extension_from_url(url))
            .await
    }
}

/// Records requests. Assets whose bytes mention `corrupt` fail to encode;
/// assets mentioning `explode` panic the encoder.
#[derive(Default)]
struct RecordingEncoder {
    requests: Mutex<Vec<ClipRequest>>,
}

#[async_trait]
impl ClipEncoder for RecordingEncoder {
    async fn encode(&self, request: &ClipRequest) -> Result<()> {
        let bytes = std::fs::read(&request.input).unwrap_or_default();
        let text = String::from_utf8_lossy(&bytes);
        if text.contains("explode") {
            panic!("encoder crashed on {}", request.input.display());
        }
        if text.contains("corrupt") {
            return Err(Error::encode(format!(
                "invalid data found when processing {}",
                request.input.display()
            )));
        }
        self.requests.lock().push(request.clone());
        Ok(())
    }
}

struct Harness {
    dir: TempDir,
    pool: DbPool,
    orchestrator: Arc<AcquisitionOrchestrator>,
    fetcher: Arc<ScriptedFetcher>,
    encoder: Arc<RecordingEncoder>,
    jobs: Arc<SqlxRenderJobRepository>,
    calls: Arc<SqlxApiCallRepository>,
}

impl Harness {
    async fn new(providers: Vec<Arc<ScriptedProvider>>, max_attempts: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let url = format!(
            "sqlite:{}?mode=rwc",
            dir.path()
                .join("broll.db")
                .to_string_lossy()
                .replace('\\', "/")
        );
        let pool = connect(&url).await.unwrap();

        let calls = Arc::new(SqlxApiCallRepository::new(pool.clone()));
        let jobs = Arc::new(SqlxRenderJobRepository::new(pool.clone()));
        let cache = Arc::new(ContentCache::new(Arc::new(SqlxMediaCacheRepository::new(
            pool.clone(),
        ))));
        let breakers = Arc::new(CircuitBreakerManager::new(5, Duration::from_secs(60)));

        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider);
        }
        let executor = RetryExecutor::new(
            breakers.clone(),
            calls.clone(),
            RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(1),
            },
        );
        let orchestrator = Arc::new(AcquisitionOrchestrator::new(
            cache,
            registry,
            breakers,
            HealthTracker::new(calls.clone()),
            executor,
            AcquisitionPolicy::default(),
        ));

        let fetcher = Arc::new(ScriptedFetcher {
            store: AssetStore::new(dir.path().join("assets")),
            fetched: Mutex::new(Vec::new()),
        });

        Self {
            dir,
            pool,
            orchestrator,
            fetcher,
            encoder: Arc::new(RecordingEncoder::default()),
            jobs,
            calls,
        }
    }

    fn settings(&self, workers: usize) -> PipelineSettings {
        PipelineSettings {
            min_workers: workers,
            max_workers: workers,
            required_disk_gb: 0.0,
            prefer_video_min_secs: 15.0,
            output_dir: self.dir.path().join("out"),
            fallback_asset: None,
            mode: "balanced".to_string(),
        }
    }

    fn pipeline(&self, settings: PipelineSettings) -> SegmentPipeline {
        let governor = ResourceGovernor::new(ThrottleConfig {
            cpu_threshold: 101.0,
            memory_threshold: 101.0,
            ..ThrottleConfig::default()
        });
        SegmentPipeline::new(
            self.orchestrator.clone(),
            self.fetcher.clone(),
            self.encoder.clone(),
            Arc::new(governor),
            Arc::new(RepositoryJobTracker::new(self.jobs.clone())),
            settings,
        )
    }
}

fn segment(index: usize, text: &str) -> Segment {
    let start = index as f64 * 5.0;
    Segment::new(start, start + 5.0, text)
}

#[tokio::test]
async fn test_five_segment_scenario() {
    // Provider A answers the first three queries and fails on the fourth.
    let provider_a = ScriptedProvider::new(
        Source::Nasa,
        &[
            ("saturn rings", "https://a.test/saturn.jpg"),
            ("mars rover", "https://a.test/mars.mp4"),
            ("jupiter storm", "https://a.test/jupiter.gif"),
        ],
    );
    let provider_b = ScriptedProvider::answering_everything(Source::Pixabay, "https://b.test/europa.jpg");
    let h = Harness::new(vec![provider_a.clone(), provider_b.clone()], 5).await;

    let segments = vec![
        segment(0, "saturn rings"),
        segment(1, "mars rover"),
        segment(2, "jupiter storm"),
        segment(3, "europa ice"),
        segment(4, "Saturn  Rings"),
    ];
    let report = h
        .pipeline(h.settings(1))
        .run("scenario", segments)
        .await
        .unwrap();

    let outcomes: Vec<_> = report.segments.iter().map(|s| s.outcome.clone()).collect();
    assert_eq!(
        outcomes,
        vec![
            SegmentOutcome::Acquired { source: "nasa".into() },
            SegmentOutcome::Acquired { source: "nasa".into() },
            SegmentOutcome::Acquired { source: "nasa".into() },
            SegmentOutcome::Acquired { source: "pixabay".into() },
            SegmentOutcome::CacheHit { source: "nasa".into() },
        ]
    );
    assert_eq!(report.workers, 1);

    // Three answers plus five failed attempts on the fourth query; the last
    // segment is served from the cache without touching any provider.
    assert_eq!(provider_a.calls(), 8);
    assert_eq!(provider_b.calls(), 1);
    assert!(h.orchestrator.breakers().is_open(Source::Nasa));
    assert!(!h.orchestrator.breakers().is_open(Source::Pixabay));
    assert_eq!(h.fetcher.fetched.lock().len(), 4);

    let nasa_stats = h.calls.stats_since("nasa", 0).await.unwrap();
    assert_eq!(nasa_stats.total_calls, 8);
    assert_eq!(nasa_stats.successful_calls, 3);

    let requests = h.encoder.requests.lock().clone();
    assert_eq!(requests.len(), 5);
    let first = requests.iter().find(|r| r.output.ends_with("clip_0000.mp4")).unwrap();
    let last = requests.iter().find(|r| r.output.ends_with("clip_0004.mp4")).unwrap();
    assert_eq!(first.input, last.input);

    let job = h.jobs.get_job(&report.job_id).await.unwrap();
    assert_eq!(job.status(), Some(RenderJobStatus::Completed));
    assert_eq!(job.completed_segments, 5);
    assert_eq!(job.failed_segments, 0);
    assert!(job.errors().is_empty());
}

#[tokio::test]
async fn test_download_failure_uses_fallback_asset() {
    let provider = ScriptedProvider::new(
        Source::Nasa,
        &[
            ("comet tail", "https://a.test/broken.jpg"),
            ("nebula", "https://a.test/nebula.jpg"),
        ],
    );
    let h = Harness::new(vec![provider], 1).await;

    let placeholder = h.dir.path().join("placeholder.png");
    std::fs::write(&placeholder, b"png").unwrap();
    let mut settings = h.settings(2);
    settings.fallback_asset = Some(placeholder.clone());

    let report = h
        .pipeline(settings)
        .run("fallback", vec![segment(0, "comet tail"), segment(1, "nebula"), segment(2, "quasar")])
        .await
        .unwrap();

    assert!(matches!(
        &report.segments[0].outcome,
        SegmentOutcome::Fallback { reason } if reason.starts_with("download failed")
    ));
    assert_eq!(
        report.segments[1].outcome,
        SegmentOutcome::Acquired { source: "nasa".into() }
    );
    assert!(matches!(
        &report.segments[2].outcome,
        SegmentOutcome::Fallback { reason } if reason == "no asset found"
    ));
    assert_eq!(report.clips().len(), 3);

    let placeholder_uses = h
        .encoder
        .requests
        .lock()
        .iter()
        .filter(|r| r.input == placeholder)
        .count();
    assert_eq!(placeholder_uses, 2);

    let job = h.jobs.get_job(&report.job_id).await.unwrap();
    assert_eq!(job.status(), Some(RenderJobStatus::Completed));
    assert_eq!(job.errors().len(), 2);
}

#[tokio::test]
async fn test_missing_fallback_reports_failed_segment() {
    let h = Harness::new(vec![], 1).await;

    let report = h
        .pipeline(h.settings(1))
        .run("nothing", vec![segment(0, "black hole")])
        .await
        .unwrap();

    assert!(matches!(report.segments[0].outcome, SegmentOutcome::Failed { .. }));
    assert!(report.segments[0].clip.is_none());

    let job = h.jobs.get_job(&report.job_id).await.unwrap();
    assert_eq!(job.status(), Some(RenderJobStatus::Completed));
    assert_eq!(job.failed_segments, 1);
}

#[tokio::test]
async fn test_panicking_segment_fails_job_after_siblings_finish() {
    let provider = ScriptedProvider::new(
        Source::Nasa,
        &[
            ("alpha", "https://a.test/alpha.jpg"),
            ("beta", "https://a.test/explode.jpg"),
            ("gamma", "https://a.test/gamma.jpg"),
        ],
    );
    let h = Harness::new(vec![provider], 1).await;

    let result = h
        .pipeline(h.settings(2))
        .run(
            "crash",
            vec![segment(0, "alpha"), segment(1, "beta"), segment(2, "gamma")],
        )
        .await;

    assert!(matches!(result, Err(Error::Other(ref msg)) if msg.contains("panicked")));
    assert_eq!(h.encoder.requests.lock().len(), 2);

    let jobs = h.jobs.list_recent_jobs(1).await.unwrap();
    let job = &jobs[0];
    assert_eq!(job.status(), Some(RenderJobStatus::Failed));
    assert_eq!(job.completed_segments, 2);
    assert_eq!(job.failed_segments, 1);
    assert!(!job.errors().is_empty());
}

#[tokio::test]
async fn test_insufficient_disk_space_is_fatal() {
    let provider = ScriptedProvider::answering_everything(Source::Nasa, "https://a.test/x.jpg");
    let h = Harness::new(vec![provider.clone()], 1).await;

    let mut settings = h.settings(1);
    settings.required_disk_gb = 1.0e9;
    let required = gb_to_bytes(settings.required_disk_gb);
    if ResourceGovernor::default().check_disk_space(h.dir.path(), required) == DiskSpaceStatus::Unknown {
        // No mounted disk could be matched on this machine.
        return;
    }

    let result = h.pipeline(settings).run("full", vec![segment(0, "x")]).await;
    assert!(matches!(result, Err(Error::InsufficientDiskSpace { .. })));
    assert_eq!(provider.calls(), 0);
    assert!(h.encoder.requests.lock().is_empty());

    let jobs = h.jobs.list_recent_jobs(1).await.unwrap();
    assert_eq!(jobs[0].status(), Some(RenderJobStatus::Failed));

    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_call")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(row.0, 0);
}

#[tokio::test]
async fn test_encode_failure_falls_back_to_placeholder() {
    let provider = ScriptedProvider::new(
        Source::Nasa,
        &[
            ("solar wind", "https://a.test/corrupt-wind.jpg"),
            ("lunar dust", "https://a.test/dust.jpg"),
        ],
    );
    let h = Harness::new(vec![provider], 1).await;

    let placeholder = h.dir.path().join("placeholder.png");
    std::fs::write(&placeholder, b"png").unwrap();
    let mut settings = h.settings(1);
    settings.fallback_asset = Some(placeholder.clone());

    let report = h
        .pipeline(settings)
        .run("encode-fallback", vec![segment(0, "solar wind"), segment(1, "lunar dust")])
        .await
        .unwrap();

    assert!(matches!(
        &report.segments[0].outcome,
        SegmentOutcome::Fallback { reason } if reason.starts_with("encode failed")
    ));
    assert!(report.segments[0].clip.is_some());
    assert_eq!(
        report.segments[1].outcome,
        SegmentOutcome::Acquired { source: "nasa".into() }
    );
    let requests = h.encoder.requests.lock().clone();
    assert!(requests.iter().any(|r| r.input == placeholder && r.output.ends_with("clip_0000.mp4")));

    let job = h.jobs.get_job(&report.job_id).await.unwrap();
    assert_eq!(job.status(), Some(RenderJobStatus::Completed));
    assert_eq!(job.completed_segments, 2);
    assert_eq!(job.errors().len(), 1);
}

#[tokio::test]
async fn test_placeholder_encode_failure_reports_failed_segment() {
    let provider = ScriptedProvider::new(Source::Nasa, &[("solar wind", "https://a.test/corrupt-wind.jpg")]);
    let h = Harness::new(vec![provider], 1).await;

    let placeholder = h.dir.path().join("placeholder.png");
    std::fs::write(&placeholder, b"corrupt placeholder").unwrap();
    let mut settings = h.settings(1);
    settings.fallback_asset = Some(placeholder);

    let report = h
        .pipeline(settings)
        .run("placeholder-broken", vec![segment(0, "solar wind")])
        .await
        .unwrap();

    assert!(matches!(
        &report.segments[0].outcome,
        SegmentOutcome::Failed { reason }
            if reason.starts_with("encode failed") && reason.contains("fallback encode failed")
    ));
    assert!(report.segments[0].clip.is_none());
    assert!(h.encoder.requests.lock().is_empty());

    let job = h.jobs.get_job(&report.job_id).await.unwrap();
    assert_eq!(job.status(), Some(RenderJobStatus::Completed));
    assert_eq!(job.failed_segments, 1);
}

#[tokio::test]
async fn test_cache_hit_with_missing_file_downloads_again() {
    let provider = ScriptedProvider::new(Source::Nasa, &[("aurora", "https://a.test/aurora.jpg")]);
    let h = Harness::new(vec![provider.clone()], 1).await;

    let first = h
        .pipeline(h.settings(1))
        .run("first", vec![segment(0, "aurora")])
        .await
        .unwrap();
    assert_eq!(
        first.segments[0].outcome,
        SegmentOutcome::Acquired { source: "nasa".into() }
    );

    let cached = h.encoder.requests.lock()[0].input.clone();
    std::fs::remove_file(&cached).unwrap();

    let second = h
        .pipeline(h.settings(1))
        .run("second", vec![segment(0, "aurora")])
        .await
        .unwrap();
    assert_eq!(
        second.segments[0].outcome,
        SegmentOutcome::CacheHit { source: "nasa".into() }
    );

    assert_eq!(provider.calls(), 1);
    assert_eq!(
        *h.fetcher.fetched.lock(),
        vec!["https://a.test/aurora.jpg".to_string(); 2]
    );
    assert!(cached.exists());

    let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_cache WHERE content_hash = ?")
        .bind(content_hash(b"https://a.test/aurora.jpg"))
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(rows.0, 1);
}

#[tokio::test]
async fn test_unwritable_output_dir_fails_job() {
    let provider = ScriptedProvider::answering_everything(Source::Nasa, "https://a.test/x.jpg");
    let h = Harness::new(vec![provider.clone()], 1).await;

    let blocker = h.dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let mut settings = h.settings(1);
    settings.output_dir = blocker.join("out");

    let result = h.pipeline(settings).run("blocked", vec![segment(0, "x")]).await;
    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(provider.calls(), 0);

    let jobs = h.jobs.list_recent_jobs(1).await.unwrap();
    assert_eq!(jobs[0].status(), Some(RenderJobStatus::Failed));
    assert_eq!(jobs[0].errors().len(), 1);
}

#[tokio::test]
async fn test_zero_worker_settings_still_make_progress() {
    let provider = ScriptedProvider::answering_everything(Source::Nasa, "https://a.test/x.jpg");
    let h = Harness::new(vec![provider], 1).await;

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        h.pipeline(h.settings(0)).run("no-workers", vec![segment(0, "x"), segment(1, "y")]),
    )
    .await
    .expect("pipeline stalled with an empty worker pool")
    .unwrap();

    assert_eq!(report.workers, 1);
    assert_eq!(report.clips().len(), 2);
}
