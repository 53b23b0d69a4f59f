//! Render job models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::now_ms;

/// Render job database model. One row per pipeline run.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: String,
    pub name: String,
    /// Render preset name
    pub mode: String,
    /// Status: PENDING, PROCESSING, COMPLETED, FAILED
    pub status: String,
    pub current_step: Option<String>,
    pub total_segments: i64,
    pub completed_segments: i64,
    pub failed_segments: i64,
    pub output_path: Option<String>,
    /// JSON array of [`ErrorLogEntry`]
    pub error_log: String,
    pub started_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

impl RenderJob {
    pub fn new(name: impl Into<String>, mode: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            mode: mode.into(),
            status: RenderJobStatus::Pending.as_str().to_string(),
            current_step: None,
            total_segments: 0,
            completed_segments: 0,
            failed_segments: 0,
            output_path: None,
            error_log: "[]".to_string(),
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn status(&self) -> Option<RenderJobStatus> {
        RenderJobStatus::parse(&self.status)
    }

    /// Parsed error log; a corrupt column reads as empty.
    pub fn errors(&self) -> Vec<ErrorLogEntry> {
        serde_json::from_str(&self.error_log).unwrap_or_default()
    }
}

/// Entry in a render job's error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub error: String,
    /// Unix epoch milliseconds
    pub timestamp: i64,
}

impl ErrorLogEntry {
    pub fn now(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            timestamp: now_ms(),
        }
    }
}

/// Render job lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RenderJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// `pending -> processing -> completed|failed`, plus `pending -> failed`.
    /// Re-entering the current non-terminal state is allowed.
    pub fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Pending | Self::Processing | Self::Failed) => true,
            (Self::Processing, Self::Processing | Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }
}
