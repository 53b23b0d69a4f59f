//! Rolling-window provider health, computed from the persisted call log.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::source::Source;
use crate::Result;
use crate::database::repositories::ApiCallRepository;
use crate::database::time::{ms_before, now_ms};

/// Health of one source over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// In `[0, 1]`; `1.0` when the window holds no calls.
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub total_calls: u64,
}

impl HealthSnapshot {
    /// Reported for a source with no calls in the window.
    pub const UNTRIED: Self = Self {
        success_rate: 1.0,
        avg_response_time_ms: 0.0,
        total_calls: 0,
    };
}

/// Aggregates the call log per source. Nothing is cached between calls.
#[derive(Clone)]
pub struct HealthTracker {
    calls: Arc<dyn ApiCallRepository>,
}

impl HealthTracker {
    pub fn new(calls: Arc<dyn ApiCallRepository>) -> Self {
        Self { calls }
    }

    pub async fn get_health(&self, source: Source, window: Duration) -> Result<HealthSnapshot> {
        let since = ms_before(now_ms(), window);
        let stats = self.calls.stats_since(source.as_str(), since).await?;

        if stats.total_calls <= 0 {
            return Ok(HealthSnapshot::UNTRIED);
        }

        let total = stats.total_calls as u64;
        Ok(HealthSnapshot {
            success_rate: (stats.successful_calls as f64 / total as f64).clamp(0.0, 1.0),
            avg_response_time_ms: stats.avg_response_time_ms.unwrap_or(0.0),
            total_calls: total,
        })
    }
}
