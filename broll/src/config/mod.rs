//! Application configuration.
//!
//! Every field has a default, so an empty or missing file is valid. Values
//! are read from TOML first, then overridden from the environment (a `.env`
//! file is honoured through dotenvy), then validated.

pub mod preset;

pub use preset::{DEFAULT_PRESET, PRESETS, RenderPreset};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};
use crate::acquisition::source::{self, Source};
use crate::acquisition::{AcquisitionPolicy, ProviderEndpoint, RetryPolicy};
use crate::encoding::{EncodeSettings, Resolution};
use crate::logging::LoggingOptions;
use crate::pipeline::PipelineSettings;
use crate::resource::ThrottleConfig;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "broll.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub acquisition: AcquisitionConfig,
    pub cache: CacheConfig,
    pub resources: ResourcesConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:broll.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub request_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub nasa: ProviderSettings,
    pub pixabay: ProviderSettings,
    pub pexels: ProviderSettings,
    pub unsplash: ProviderSettings,
    pub giphy: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            download_timeout_secs: 30,
            nasa: ProviderSettings::default(),
            pixabay: ProviderSettings::default(),
            pexels: ProviderSettings::default(),
            unsplash: ProviderSettings::default(),
            giphy: ProviderSettings::default(),
        }
    }
}

impl ProvidersConfig {
    pub fn settings(&self, source: Source) -> &ProviderSettings {
        match source {
            Source::Nasa => &self.nasa,
            Source::Pixabay => &self.pixabay,
            Source::Pexels => &self.pexels,
            Source::Unsplash => &self.unsplash,
            Source::Giphy => &self.giphy,
        }
    }

    fn settings_mut(&mut self, source: Source) -> &mut ProviderSettings {
        match source {
            Source::Nasa => &mut self.nasa,
            Source::Pixabay => &mut self.pixabay,
            Source::Pexels => &mut self.pexels,
            Source::Unsplash => &mut self.unsplash,
            Source::Giphy => &mut self.giphy,
        }
    }

    pub fn endpoints(&self) -> HashMap<Source, ProviderEndpoint> {
        Source::ALL
            .iter()
            .map(|&source| {
                let settings = self.settings(source);
                (
                    source,
                    ProviderEndpoint {
                        base_url: settings.base_url.clone(),
                        api_key: settings.api_key.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub health_floor: f64,
    pub health_window_minutes: u64,
    pub default_order: Vec<Source>,
    pub video_order: Vec<Source>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
            max_attempts: 3,
            base_delay_ms: 1000,
            health_floor: 0.3,
            health_window_minutes: 30,
            default_order: source::default_order(),
            video_order: source::video_order(),
        }
    }
}

impl AcquisitionConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }

    pub fn policy(&self) -> AcquisitionPolicy {
        AcquisitionPolicy {
            default_order: self.default_order.clone(),
            video_order: self.video_order.clone(),
            health_floor: self.health_floor,
            health_window: Duration::from_secs(self.health_window_minutes * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub retention_days: u64,
    pub default_quality_score: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache/media"),
            retention_days: 30,
            default_quality_score: crate::cache::DEFAULT_QUALITY_SCORE,
        }
    }
}

impl CacheConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    pub min_workers: usize,
    /// Defaults to the render preset's worker count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    pub cpu_threshold: f32,
    pub memory_threshold: f32,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
    pub required_disk_gb: f64,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: None,
            cpu_threshold: 90.0,
            memory_threshold: 85.0,
            poll_interval_secs: 5,
            max_wait_secs: 300,
            required_disk_gb: 5.0,
        }
    }
}

impl ResourcesConfig {
    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            cpu_threshold: self.cpu_threshold,
            memory_threshold: self.memory_threshold,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub preset: String,
    pub output_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_asset: Option<PathBuf>,
    pub prefer_video_min_secs: f64,
    pub ffmpeg_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crf: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_ken_burns: Option<bool>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            preset: DEFAULT_PRESET.to_string(),
            output_dir: PathBuf::from("output"),
            fallback_asset: None,
            prefer_video_min_secs: 15.0,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            resolution: None,
            crf: None,
            speed_preset: None,
            use_ken_burns: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub retention_days: i64,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            filter: None,
            retention_days: crate::logging::DEFAULT_RETENTION_DAYS,
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn options(&self) -> LoggingOptions {
        LoggingOptions {
            filter: self.filter.clone(),
            log_dir: self.dir.clone(),
            json: self.json,
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from `broll.toml` when present, then apply
    /// environment overrides and validate.
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::config(format!("invalid config: {e}")))
    }

    /// Apply environment overrides through `lookup`. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("BROLL_DATABASE_URL") {
            self.database.url = url;
        }
        for source in Source::ALL {
            if let Some(key) = source.info().credential_env.and_then(|env| get(env)) {
                self.providers.settings_mut(source).api_key = Some(key);
            }
        }
        if let Some(base) = get("NASA_API_BASE") {
            self.providers.nasa.base_url = Some(base);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let acq = &self.acquisition;
        if !(0.0..=1.0).contains(&acq.health_floor) {
            return Err(Error::config(format!(
                "acquisition.health_floor must be within [0, 1], got {}",
                acq.health_floor
            )));
        }
        if acq.max_attempts == 0 {
            return Err(Error::config("acquisition.max_attempts must be at least 1"));
        }
        if acq.failure_threshold == 0 {
            return Err(Error::config(
                "acquisition.failure_threshold must be at least 1",
            ));
        }
        if acq.default_order.is_empty() || acq.video_order.is_empty() {
            return Err(Error::config("acquisition source orders must not be empty"));
        }
        if self.resources.min_workers == 0 {
            return Err(Error::config("resources.min_workers must be at least 1"));
        }
        let max_workers = self.max_workers()?;
        if self.resources.min_workers > max_workers {
            return Err(Error::config(format!(
                "resources.min_workers ({}) exceeds max_workers ({})",
                self.resources.min_workers, max_workers
            )));
        }
        Ok(())
    }

    pub fn preset(&self) -> Result<&'static RenderPreset> {
        RenderPreset::find(&self.render.preset)
    }

    pub fn max_workers(&self) -> Result<usize> {
        match self.resources.max_workers {
            Some(n) => Ok(n),
            None => Ok(self.preset()?.max_workers),
        }
    }

    /// Preset values with explicit `render.*` overrides applied.
    pub fn encode_settings(&self) -> Result<EncodeSettings> {
        let preset = self.preset()?;
        let render = &self.render;
        Ok(EncodeSettings {
            resolution: render.resolution.unwrap_or(preset.resolution),
            quality: render.crf.unwrap_or(preset.crf),
            speed_preset: render
                .speed_preset
                .clone()
                .unwrap_or_else(|| preset.speed_preset.to_string()),
            ken_burns: render.use_ken_burns.unwrap_or(preset.ken_burns),
        })
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            min_workers: self.resources.min_workers,
            max_workers: self.max_workers()?,
            required_disk_gb: self.resources.required_disk_gb,
            prefer_video_min_secs: self.render.prefer_video_min_secs,
            output_dir: self.render.output_dir.clone(),
            fallback_asset: self.render.fallback_asset.clone(),
            mode: self.preset()?.name.to_string(),
        })
    }
}
