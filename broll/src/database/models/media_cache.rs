//! Media cache models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::Path;

/// A cached media asset, unique by `content_hash`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct MediaCacheEntry {
    pub id: String,
    /// Normalized query (lower-cased, whitespace-collapsed)
    pub query: String,
    pub source: String,
    pub source_url: String,
    pub local_path: String,
    /// Hex SHA-256 of the file bytes
    pub content_hash: String,
    /// IMAGE, VIDEO or ANIMATED
    pub media_kind: String,
    pub resolution: Option<String>,
    pub file_size: i64,
    pub quality_score: i64,
    pub use_count: i64,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
    pub expires_at: i64,
}

impl MediaCacheEntry {
    pub fn kind(&self) -> MediaKind {
        MediaKind::parse(&self.media_kind).unwrap_or(MediaKind::Image)
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }
}

/// Input for [`crate::cache::ContentCache::insert`].
#[derive(Debug, Clone)]
pub struct NewMediaCacheEntry {
    pub query: String,
    pub source: String,
    pub source_url: String,
    pub local_path: String,
    pub content_hash: String,
    pub kind: MediaKind,
    pub resolution: Option<String>,
    pub file_size: i64,
    pub quality_score: Option<i64>,
}

/// Kind of media stored in the cache.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    Image,
    Video,
    /// GIFs and similar; encoded like video.
    Animated,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Animated => "ANIMATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IMAGE" => Some(Self::Image),
            "VIDEO" => Some(Self::Video),
            "ANIMATED" => Some(Self::Animated),
            _ => None,
        }
    }

    /// Infer the kind from a file extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "webm" | "mov" | "m4v" => Self::Video,
            "gif" => Self::Animated,
            _ => Self::Image,
        }
    }

    /// Infer the kind from a URL or path, ignoring any query string.
    pub fn infer(url_or_path: &str) -> Self {
        let without_query = url_or_path
            .split(['?', '#'])
            .next()
            .unwrap_or(url_or_path);
        Path::new(without_query)
            .extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Image)
    }

    /// Whether the asset already moves and only needs transcoding.
    pub fn is_motion(&self) -> bool {
        matches!(self, Self::Video | Self::Animated)
    }
}
