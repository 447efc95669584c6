//! Uniform response envelope for workflow executions
//!
//! Every response on the execution endpoint is emitted in this shape,
//! whether the pipeline succeeded, validation failed, the client was rate
//! limited, or the upstream errored. `execution_id` is assigned exactly
//! once at request entry and `duration_ms` is always measured from request
//! entry, never from a sub-stage.

use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;

/// Timestamped, timed, identified wrapper around any execution outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Whether the execution succeeded
    pub success: bool,
    /// Normalized upstream payload (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Structured failure detail (failure only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    /// Completion timestamp, ISO-8601 with milliseconds
    pub executed_at: String,
    /// Unique identifier assigned at request entry
    pub execution_id: String,
    /// Wall-clock elapsed since request entry
    pub duration_ms: u64,
}

impl Envelope {
    /// Wrap a successful outcome.
    #[must_use]
    pub fn success(execution_id: &str, started_at: Instant, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            executed_at: now_iso(),
            execution_id: execution_id.to_string(),
            duration_ms: elapsed_ms(started_at),
        }
    }

    /// Wrap a failure outcome.
    #[must_use]
    pub fn failure(execution_id: &str, started_at: Instant, error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            executed_at: now_iso(),
            execution_id: execution_id.to_string(),
            duration_ms: elapsed_ms(started_at),
        }
    }

    /// Outer HTTP status for this envelope: 200 on success, otherwise the
    /// failure's upstream status, defaulting to 500.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        if self.success {
            200
        } else {
            self.error
                .as_ref()
                .map_or(500, ApiError::status_or_default)
        }
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started_at: Instant) -> u64 {
    started_at.elapsed().as_millis() as u64
}
