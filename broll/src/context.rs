//! Wiring of the long-lived components from an [`AppConfig`].

use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::acquisition::{
    AcquisitionOrchestrator, CircuitBreakerManager, HealthTracker, ProviderRegistry,
    RetryExecutor,
};
use crate::cache::{AssetStore, ContentCache};
use crate::config::AppConfig;
use crate::database::{self, DbPool};
use crate::database::repositories::{
    ApiCallRepository, RenderJobRepository, SqlxApiCallRepository, SqlxMediaCacheRepository,
    SqlxRenderJobRepository,
};
use crate::encoding::{FfmpegEncoder, HardwareAccel};
use crate::maintenance::{MaintenanceConfig, MaintenanceRunner};
use crate::pipeline::{HttpAssetFetcher, RepositoryJobTracker, SegmentPipeline};
use crate::resource::ResourceGovernor;
use crate::utils::http_client;

/// Store handles and shared services for one process.
pub struct AppContext {
    pub config: AppConfig,
    pub pool: DbPool,
    pub calls: Arc<dyn ApiCallRepository>,
    pub jobs: Arc<dyn RenderJobRepository>,
    pub cache: Arc<ContentCache>,
    pub health: HealthTracker,
}

impl AppContext {
    /// Open the database and build the store-backed services.
    pub async fn connect(config: AppConfig) -> Result<Self> {
        http_client::install_rustls_provider();

        let pool = database::connect(&config.database.url).await?;
        let calls: Arc<dyn ApiCallRepository> = Arc::new(SqlxApiCallRepository::new(pool.clone()));
        let jobs: Arc<dyn RenderJobRepository> =
            Arc::new(SqlxRenderJobRepository::new(pool.clone()));
        let cache = Arc::new(
            ContentCache::new(Arc::new(SqlxMediaCacheRepository::new(pool.clone())))
                .with_retention(config.cache.retention())
                .with_default_quality(config.cache.default_quality_score),
        );
        let health = HealthTracker::new(calls.clone());

        Ok(Self {
            config,
            pool,
            calls,
            jobs,
            cache,
            health,
        })
    }

    /// A fresh orchestrator; breaker state starts closed for every source.
    pub fn orchestrator(&self) -> Result<AcquisitionOrchestrator> {
        let acq = &self.config.acquisition;
        let client = http_client::build_client(self.config.providers.request_timeout())?;
        let providers = ProviderRegistry::with_defaults(&client, &self.config.providers.endpoints());
        let breakers = Arc::new(CircuitBreakerManager::new(
            acq.failure_threshold,
            acq.cooldown(),
        ));
        let executor = RetryExecutor::new(breakers.clone(), self.calls.clone(), acq.retry_policy());

        Ok(AcquisitionOrchestrator::new(
            self.cache.clone(),
            providers,
            breakers,
            self.health.clone(),
            executor,
            acq.policy(),
        ))
    }

    /// Everything needed for one render run, with hardware detected now.
    pub async fn pipeline(&self) -> Result<SegmentPipeline> {
        let accel = HardwareAccel::detect().await;
        let encoder = FfmpegEncoder::new(
            self.config.render.ffmpeg_path.clone(),
            accel,
            self.config.encode_settings()?,
        );
        let download_client =
            http_client::build_client(self.config.providers.download_timeout())?;
        let fetcher = HttpAssetFetcher::new(download_client, AssetStore::new(&self.config.cache.dir));
        let settings = self.config.pipeline_settings()?;

        info!(
            preset = %settings.mode,
            encoder = encoder.accel().encoder(),
            max_workers = settings.max_workers,
            "Pipeline configured"
        );

        Ok(SegmentPipeline::new(
            Arc::new(self.orchestrator()?),
            Arc::new(fetcher),
            Arc::new(encoder),
            Arc::new(ResourceGovernor::new(self.config.resources.throttle())),
            Arc::new(RepositoryJobTracker::new(self.jobs.clone())),
            settings,
        ))
    }

    pub fn maintenance(&self) -> MaintenanceRunner {
        MaintenanceRunner::new(
            self.pool.clone(),
            self.cache.clone(),
            self.calls.clone(),
            MaintenanceConfig::default(),
        )
    }
}
