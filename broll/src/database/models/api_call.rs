//! Provider call log models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One provider call attempt. Rows are append-only.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub id: i64,
    pub source: String,
    pub query: String,
    pub success: bool,
    pub response_time_ms: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
}

/// A call attempt to be appended to the log.
#[derive(Debug, Clone)]
pub struct NewApiCall {
    pub source: String,
    pub query: String,
    pub success: bool,
    pub response_time_ms: i64,
    pub error_message: Option<String>,
}

impl NewApiCall {
    pub fn success(source: impl Into<String>, query: impl Into<String>, elapsed_ms: i64) -> Self {
        Self {
            source: source.into(),
            query: query.into(),
            success: true,
            response_time_ms: elapsed_ms,
            error_message: None,
        }
    }

    pub fn failure(
        source: impl Into<String>,
        query: impl Into<String>,
        elapsed_ms: i64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            query: query.into(),
            success: false,
            response_time_ms: elapsed_ms,
            error_message: Some(error.into()),
        }
    }
}

/// Aggregate over the call log for one source inside a time window.
#[derive(Debug, Clone, Default, FromRow)]
pub struct CallStats {
    pub total_calls: i64,
    pub successful_calls: i64,
    pub avg_response_time_ms: Option<f64>,
}
