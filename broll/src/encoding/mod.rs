//! Clip encoding.
//!
//! [`HardwareAccel`] picks encoder arguments and scale filters for the
//! detected accelerator; [`ffmpeg`] builds and runs the per-segment commands.

pub mod ffmpeg;
pub mod hardware;

pub use ffmpeg::{ClipRequest, FfmpegEncoder};
pub use hardware::HardwareAccel;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Renders one clip for a segment.
#[async_trait]
pub trait ClipEncoder: Send + Sync {
    async fn encode(&self, request: &ClipRequest) -> crate::Result<()>;
}

/// Output frame size, written `WxH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::Error::validation(format!("invalid resolution '{s}', expected WxH"));
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.parse().map_err(|_| invalid())?;
        let height: u32 = h.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

/// Quality knobs shared by every clip in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub resolution: Resolution,
    /// CRF for software, CQ/QP for hardware encoders.
    pub quality: u32,
    /// x264 speed preset (`ultrafast` .. `slower`).
    pub speed_preset: String,
    /// Synthesize a slow zoom for still images.
    pub ken_burns: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(1280, 720),
            quality: 23,
            speed_preset: "medium".to_string(),
            ken_burns: true,
        }
    }
}
