//! Source registry.
//!
//! Static metadata for every media provider the acquisition layer knows
//! about. Nothing here performs I/O.

use serde::{Deserialize, Serialize};

/// A media search provider.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Nasa,
    Pixabay,
    Pexels,
    Unsplash,
    Giphy,
}

/// Static description of a [`Source`].
#[derive(Debug, Clone, Copy)]
pub struct SourceInfo {
    pub source: Source,
    pub display_name: &'static str,
    /// Environment variable holding the credential; `None` for open APIs.
    pub credential_env: Option<&'static str>,
    pub default_base_url: &'static str,
    /// Returns moving media (video or animation) for at least some queries.
    pub motion_capable: bool,
}

static SOURCES: &[SourceInfo] = &[
    SourceInfo {
        source: Source::Nasa,
        display_name: "NASA Image and Video Library",
        credential_env: None,
        default_base_url: "https://images-api.nasa.gov",
        motion_capable: true,
    },
    SourceInfo {
        source: Source::Pixabay,
        display_name: "Pixabay",
        credential_env: Some("PIXABAY_API_KEY"),
        default_base_url: "https://pixabay.com/api",
        motion_capable: true,
    },
    SourceInfo {
        source: Source::Pexels,
        display_name: "Pexels",
        credential_env: Some("PEXELS_API_KEY"),
        default_base_url: "https://api.pexels.com/v1",
        motion_capable: false,
    },
    SourceInfo {
        source: Source::Unsplash,
        display_name: "Unsplash",
        credential_env: Some("UNSPLASH_ACCESS_KEY"),
        default_base_url: "https://api.unsplash.com",
        motion_capable: false,
    },
    SourceInfo {
        source: Source::Giphy,
        display_name: "Giphy",
        credential_env: Some("GIPHY_API_KEY"),
        default_base_url: "https://api.giphy.com/v1",
        motion_capable: true,
    },
];

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Nasa,
        Source::Pixabay,
        Source::Pexels,
        Source::Unsplash,
        Source::Giphy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nasa => "nasa",
            Self::Pixabay => "pixabay",
            Self::Pexels => "pexels",
            Self::Unsplash => "unsplash",
            Self::Giphy => "giphy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    pub fn info(&self) -> &'static SourceInfo {
        // SOURCES is declared in enum order.
        &SOURCES[*self as usize]
    }

    pub fn requires_credential(&self) -> bool {
        self.info().credential_env.is_some()
    }
}

/// Ordering used when a segment does not prefer video.
pub fn default_order() -> Vec<Source> {
    vec![Source::Nasa, Source::Pixabay, Source::Pexels, Source::Unsplash]
}

/// Ordering used when a segment prefers moving footage.
pub fn video_order() -> Vec<Source> {
    vec![Source::Pixabay, Source::Nasa, Source::Pexels, Source::Giphy]
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_registry_matches_enum_order() {
        for source in Source::iter() {
            assert_eq!(source.info().source, source);
        }
        assert_eq!(Source::iter().count(), SOURCES.len());
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(Source::parse("pexels"), Some(Source::Pexels));
        assert_eq!(Source::parse("flickr"), None);
        assert_eq!(Source::Giphy.to_string(), "giphy");
        assert_eq!(Source::Unsplash.as_str(), "unsplash");
    }

    #[test]
    fn test_credentials() {
        assert!(!Source::Nasa.requires_credential());
        assert_eq!(
            Source::Pexels.info().credential_env,
            Some("PEXELS_API_KEY")
        );
    }

    #[test]
    fn test_video_order_leads_with_motion_sources() {
        assert!(video_order()[0].info().motion_capable);
        assert!(!default_order().contains(&Source::Giphy));
    }
}
