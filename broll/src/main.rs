use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use broll::acquisition::{FoundAsset, SearchOutcome, Source};
use broll::config::{AppConfig, PRESETS};
use broll::context::AppContext;
use broll::database::repositories::RenderJobRepository;
use broll::encoding::HardwareAccel;
use broll::logging::{self, LoggingOptions};
use broll::pipeline::{SegmentSource, TranscriptFile};

#[derive(Parser, Debug)]
#[command(name = "broll", version, about = "Find, cache and render B-roll clips for narrated segments")]
struct Args {
    /// Path to a TOML config file (defaults to ./broll.toml when present)
    #[arg(short, long, global = true, env = "BROLL_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one clip per segment of a transcript
    Run {
        /// JSON array of {start, end, text}, or an object with a `segments` array
        #[arg(short, long)]
        segments: PathBuf,
        #[arg(long, default_value = "broll-run")]
        job_name: String,
        /// Override the configured render preset
        #[arg(long)]
        preset: Option<String>,
    },
    /// Search providers (or the cache) for one query
    Search {
        query: String,
        #[arg(long)]
        prefer_video: bool,
    },
    /// Per-source success rate over a trailing window
    Health {
        /// Window in minutes
        #[arg(long, default_value_t = 30)]
        window: u64,
    },
    /// Show the detected encoder profile
    Hardware,
    /// Sweep expired cache entries and prune the call log
    Maintenance,
    /// List render presets
    Presets,
    /// Show recent render jobs
    Jobs {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Command::Run {
        preset: Some(preset),
        ..
    } = &args.command
    {
        config.render.preset = preset.clone();
        config.validate()?;
    }

    let mut log_options: LoggingOptions = config.logging.options();
    if args.verbose {
        log_options.filter = Some("broll=debug,sqlx=warn".to_string());
    }
    let _guard = logging::init_logging(&log_options)?;
    if let Some(dir) = &config.logging.dir {
        if let Err(e) = logging::cleanup_old_logs(dir, config.logging.retention_days).await {
            warn!(error = %e, "Log cleanup failed");
        }
    }

    match args.command {
        Command::Presets => {
            print_json(&PRESETS)?;
            Ok(())
        }
        Command::Hardware => {
            let accel = HardwareAccel::detect().await;
            let settings = config.encode_settings()?;
            print_json(&json!({
                "accel": accel,
                "encoder": accel.encoder(),
                "args": accel.encoding_args(&settings),
                "scale_filter": accel.scale_filter(settings.resolution),
                "upload_filter": accel.hw_upload_filter(),
            }))
        }
        command => run_with_store(config, command).await,
    }
}

async fn run_with_store(config: AppConfig, command: Command) -> anyhow::Result<()> {
    let ctx = AppContext::connect(config).await?;

    match command {
        Command::Run {
            segments, job_name, ..
        } => {
            let segments = TranscriptFile::new(&segments)
                .segments()
                .await
                .with_context(|| format!("reading segments from {}", segments.display()))?;
            info!(count = segments.len(), "Loaded segments");

            let pipeline = ctx.pipeline().await?;
            let report = pipeline.run(&job_name, segments).await?;
            print_json(&report)
        }
        Command::Search {
            query,
            prefer_video,
        } => {
            let orchestrator = ctx.orchestrator()?;
            let outcome = orchestrator.search(&query, prefer_video).await?;
            let body = match outcome {
                SearchOutcome::Found(asset) => json!({
                    "found": true,
                    "url": asset.url(),
                    "source": asset.source_name(),
                    "cached": matches!(asset, FoundAsset::Cached(_)),
                }),
                SearchOutcome::NotFound => json!({ "found": false }),
            };
            print_json(&body)
        }
        Command::Health { window } => {
            let window = Duration::from_secs(window * 60);
            let mut rows = Vec::with_capacity(Source::ALL.len());
            for source in Source::ALL {
                let health = ctx.health.get_health(source, window).await?;
                rows.push(json!({
                    "source": source,
                    "success_rate": health.success_rate,
                    "avg_response_time_ms": health.avg_response_time_ms,
                    "total_calls": health.total_calls,
                }));
            }
            print_json(&rows)
        }
        Command::Maintenance => {
            let report = ctx.maintenance().run_maintenance().await?;
            print_json(&report)
        }
        Command::Jobs { limit } => {
            let jobs = ctx.jobs.list_recent_jobs(limit).await?;
            let rows: Vec<_> = jobs
                .iter()
                .map(|job| {
                    json!({
                        "id": job.id,
                        "name": job.name,
                        "mode": job.mode,
                        "status": job.status,
                        "step": job.current_step,
                        "segments": {
                            "total": job.total_segments,
                            "completed": job.completed_segments,
                            "failed": job.failed_segments,
                        },
                        "errors": job.errors(),
                    })
                })
                .collect();
            print_json(&rows)
        }
        Command::Presets | Command::Hardware => Ok(()),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
