//! Named render quality presets.

use serde::Serialize;

use crate::{Error, Result};
use crate::encoding::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderPreset {
    pub name: &'static str,
    pub resolution: Resolution,
    pub speed_preset: &'static str,
    pub crf: u32,
    pub ken_burns: bool,
    pub max_workers: usize,
}

pub const DEFAULT_PRESET: &str = "balanced";

pub static PRESETS: &[RenderPreset] = &[
    RenderPreset {
        name: "ultra_fast",
        resolution: Resolution::new(640, 360),
        speed_preset: "ultrafast",
        crf: 30,
        ken_burns: false,
        max_workers: 8,
    },
    RenderPreset {
        name: "fast",
        resolution: Resolution::new(854, 480),
        speed_preset: "veryfast",
        crf: 28,
        ken_burns: false,
        max_workers: 6,
    },
    RenderPreset {
        name: "balanced",
        resolution: Resolution::new(1280, 720),
        speed_preset: "medium",
        crf: 23,
        ken_burns: true,
        max_workers: 4,
    },
    RenderPreset {
        name: "hq",
        resolution: Resolution::new(1920, 1080),
        speed_preset: "slow",
        crf: 20,
        ken_burns: true,
        max_workers: 3,
    },
    RenderPreset {
        name: "production",
        resolution: Resolution::new(1920, 1080),
        speed_preset: "slower",
        crf: 18,
        ken_burns: true,
        max_workers: 2,
    },
];

impl RenderPreset {
    pub fn find(name: &str) -> Result<&'static RenderPreset> {
        PRESETS
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| {
                let available: Vec<&str> = PRESETS.iter().map(|p| p.name).collect();
                Error::config(format!(
                    "unknown render preset '{}', available: {}",
                    name,
                    available.join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_preset() {
        let preset = RenderPreset::find("HQ").unwrap();
        assert_eq!(preset.resolution, Resolution::new(1920, 1080));
        assert_eq!(RenderPreset::find(DEFAULT_PRESET).unwrap().crf, 23);

        let err = RenderPreset::find("cinema").unwrap_err().to_string();
        assert!(err.contains("ultra_fast"));
        assert!(err.contains("production"));
    }
}
