//! Hardware encoder selection.
//!
//! Detection is best-effort: every probe is bounded and any failure falls
//! through to the software profile. After detection everything is a pure
//! lookup on the selected profile.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::{EncodeSettings, Resolution};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Detected video acceleration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HardwareAccel {
    Nvidia { name: String },
    Vaapi,
    VideoToolbox,
    #[default]
    Software,
}

impl HardwareAccel {
    /// Probe the platform for an accelerator.
    pub async fn detect() -> Self {
        let accel = detect_platform().await;
        info!(accel = accel.label(), encoder = accel.encoder(), "Selected encoder profile");
        accel
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Nvidia { .. } => "nvidia",
            Self::Vaapi => "vaapi",
            Self::VideoToolbox => "videotoolbox",
            Self::Software => "software",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::Software)
    }

    pub fn encoder(&self) -> &'static str {
        match self {
            Self::Nvidia { .. } => "h264_nvenc",
            Self::Vaapi => "h264_vaapi",
            Self::VideoToolbox => "h264_videotoolbox",
            Self::Software => "libx264",
        }
    }

    /// Encoder arguments (`-c:v ...` onwards) for the given settings.
    pub fn encoding_args(&self, settings: &EncodeSettings) -> Vec<String> {
        let quality = settings.quality.to_string();
        let quality = quality.as_str();
        let args: Vec<&str> = match self {
            Self::Nvidia { .. } => vec![
                "-c:v", "h264_nvenc", "-preset", "p4", "-rc", "vbr", "-cq", quality, "-b:v", "0",
            ],
            Self::Vaapi => vec!["-c:v", "h264_vaapi", "-qp", quality],
            Self::VideoToolbox => vec!["-c:v", "h264_videotoolbox", "-b:v", "5M"],
            Self::Software => vec![
                "-c:v",
                "libx264",
                "-preset",
                settings.speed_preset.as_str(),
                "-crf",
                quality,
            ],
        };
        args.into_iter().map(str::to_string).collect()
    }

    pub fn scale_filter(&self, resolution: Resolution) -> String {
        match self {
            Self::Nvidia { .. } => format!("scale_cuda={resolution}"),
            Self::Vaapi => format!(
                "scale_vaapi=w={}:h={}",
                resolution.width, resolution.height
            ),
            Self::VideoToolbox | Self::Software => format!("scale={resolution}"),
        }
    }

    /// Filter moving software frames onto the device, when the scaler needs it.
    pub fn hw_upload_filter(&self) -> Option<&'static str> {
        match self {
            Self::Nvidia { .. } => Some("hwupload_cuda"),
            Self::Vaapi => Some("format=nv12,hwupload"),
            Self::VideoToolbox | Self::Software => None,
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "windows"))]
async fn detect_nvidia() -> Option<HardwareAccel> {
    let out = process_utils::probe(
        "nvidia-smi",
        ["--query-gpu=name", "--format=csv,noheader"],
        PROBE_TIMEOUT,
    )
    .await?;
    if !out.has_output() {
        return None;
    }
    let name = out.stdout.lines().next().unwrap_or_default().trim().to_string();
    debug!(gpu = %name, "nvidia-smi reported a GPU");
    Some(HardwareAccel::Nvidia { name })
}

#[cfg(target_os = "linux")]
async fn detect_platform() -> HardwareAccel {
    if let Some(accel) = detect_nvidia().await {
        return accel;
    }
    match process_utils::probe("vainfo", std::iter::empty::<&str>(), PROBE_TIMEOUT).await {
        Some(out) if out.success && out.stdout.contains("VAProfile") => HardwareAccel::Vaapi,
        _ => HardwareAccel::Software,
    }
}

#[cfg(target_os = "macos")]
async fn detect_platform() -> HardwareAccel {
    match process_utils::probe("system_profiler", ["SPDisplaysDataType"], PROBE_TIMEOUT).await {
        Some(out) if out.has_output() => HardwareAccel::VideoToolbox,
        _ => HardwareAccel::Software,
    }
}

#[cfg(target_os = "windows")]
async fn detect_platform() -> HardwareAccel {
    detect_nvidia().await.unwrap_or(HardwareAccel::Software)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
async fn detect_platform() -> HardwareAccel {
    HardwareAccel::Software
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn settings() -> EncodeSettings {
        EncodeSettings {
            resolution: Resolution::new(1280, 720),
            quality: 23,
            speed_preset: "fast".to_string(),
            ken_burns: true,
        }
    }

    #[rstest]
    #[case(HardwareAccel::Nvidia { name: "RTX".into() }, "-c:v h264_nvenc -preset p4 -rc vbr -cq 23 -b:v 0")]
    #[case(HardwareAccel::Vaapi, "-c:v h264_vaapi -qp 23")]
    #[case(HardwareAccel::VideoToolbox, "-c:v h264_videotoolbox -b:v 5M")]
    #[case(HardwareAccel::Software, "-c:v libx264 -preset fast -crf 23")]
    fn test_encoding_args(#[case] accel: HardwareAccel, #[case] expected: &str) {
        assert_eq!(accel.encoding_args(&settings()).join(" "), expected);
    }

    #[rstest]
    #[case(HardwareAccel::Nvidia { name: "RTX".into() }, "scale_cuda=1280x720", Some("hwupload_cuda"))]
    #[case(HardwareAccel::Vaapi, "scale_vaapi=w=1280:h=720", Some("format=nv12,hwupload"))]
    #[case(HardwareAccel::VideoToolbox, "scale=1280x720", None)]
    #[case(HardwareAccel::Software, "scale=1280x720", None)]
    fn test_filters(
        #[case] accel: HardwareAccel,
        #[case] scale: &str,
        #[case] upload: Option<&str>,
    ) {
        assert_eq!(accel.scale_filter(Resolution::new(1280, 720)), scale);
        assert_eq!(accel.hw_upload_filter(), upload);
    }

    #[tokio::test]
    async fn test_detect_never_fails() {
        let accel = HardwareAccel::detect().await;
        assert!(!accel.encoder().is_empty());
    }
}
