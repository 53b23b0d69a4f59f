//! ffmpeg clip rendering.
//!
//! Moving sources (video, GIF) are transcoded directly, trimmed to the
//! segment duration. Still images are looped, optionally with a slow
//! zoompan, for the same duration.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use super::hardware::HardwareAccel;
use super::{ClipEncoder, EncodeSettings};
use crate::database::models::MediaKind;
use crate::{Error, Result};

/// Frame rate zoompan synthesizes stills at.
const STILL_FPS: f64 = 25.0;
/// Zoom increment per frame for stills.
const ZOOM_STEP: &str = "0.0015";
/// stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// One clip to render.
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub kind: MediaKind,
    /// Seconds.
    pub duration: f64,
}

pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    accel: HardwareAccel,
    settings: EncodeSettings,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, accel: HardwareAccel, settings: EncodeSettings) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            accel,
            settings,
        }
    }

    pub fn accel(&self) -> &HardwareAccel {
        &self.accel
    }

    pub fn settings(&self) -> &EncodeSettings {
        &self.settings
    }

    /// Whether the configured ffmpeg binary runs at all.
    pub async fn is_available(&self) -> bool {
        process_utils::probe(&self.ffmpeg_path, ["-version"], Duration::from_secs(5))
            .await
            .is_some_and(|out| out.success)
    }

    fn filter_chain(&self, lead: Option<String>) -> String {
        let scale = self.accel.scale_filter(self.settings.resolution);
        let mut parts: Vec<String> = lead.into_iter().collect();
        match self.accel.hw_upload_filter() {
            Some(upload) => {
                parts.push(upload.to_string());
                parts.push(scale);
            }
            None => {
                parts.push(scale);
                parts.push("format=yuv420p".to_string());
            }
        }
        parts.join(",")
    }

    /// Full ffmpeg argument list for `request`, excluding the program.
    pub fn build_args(&self, request: &ClipRequest) -> Vec<String> {
        let duration = format!("{:.3}", request.duration.max(0.0));
        let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];

        if request.kind.is_motion() {
            args.extend([
                "-i".into(),
                path_arg(&request.input),
                "-t".into(),
                duration,
                "-vf".into(),
                self.filter_chain(None),
            ]);
        } else {
            args.extend([
                "-loop".into(),
                "1".into(),
                "-t".into(),
                duration,
                "-i".into(),
                path_arg(&request.input),
            ]);
            if self.settings.ken_burns {
                let frames = (STILL_FPS * request.duration).round().max(1.0) as u64;
                let zoompan = format!(
                    "zoompan=z='zoom+{ZOOM_STEP}':d={frames}:s={}",
                    self.settings.resolution
                );
                args.extend(["-filter_complex".into(), self.filter_chain(Some(zoompan))]);
            } else {
                args.extend(["-vf".into(), self.filter_chain(None)]);
            }
        }

        args.extend(self.accel.encoding_args(&self.settings));
        args.extend(["-colorspace".into(), "bt709".into()]);
        if self.accel.hw_upload_filter().is_none() {
            args.extend(["-pix_fmt".into(), "yuv420p".into()]);
        }
        args.extend([
            "-an".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-nostats".into(),
            "-loglevel".into(),
            "error".into(),
            path_arg(&request.output),
        ]);
        args
    }

    async fn run(&self, request: &ClipRequest) -> Result<()> {
        let args = self.build_args(request);
        debug!(ffmpeg = %self.ffmpeg_path.display(), args = ?args, "Spawning ffmpeg");

        let started = Instant::now();
        let mut command = process_utils::tokio_command(&self.ffmpeg_path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::encode(format!("failed to spawn ffmpeg: {e}")))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.to_lowercase().contains("error") {
                        warn!("ffmpeg: {}", line);
                    } else {
                        debug!("ffmpeg: {}", line);
                    }
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>().join("\n")
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(seconds) = parse_out_time(&line) {
                    debug!(
                        output = %request.output.display(),
                        "progress {:.1}/{:.1}s",
                        seconds,
                        request.duration
                    );
                } else if line.trim() == "progress=end" {
                    break;
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::encode(format!("failed to wait for ffmpeg: {e}")))?;

        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(Error::encode(format!(
                "ffmpeg exited with {status} for {}: {stderr_tail}",
                request.input.display()
            )));
        }

        debug!(
            output = %request.output.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Clip encoded"
        );
        Ok(())
    }
}

#[async_trait]
impl ClipEncoder for FfmpegEncoder {
    async fn encode(&self, request: &ClipRequest) -> Result<()> {
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.run(request).await
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Seconds from an ffmpeg `-progress` line such as `out_time=00:01:02.500000`.
pub fn parse_out_time(line: &str) -> Option<f64> {
    let value = line.trim().strip_prefix("out_time=")?;
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
