use serde::Serialize;

use crate::domain::EventId;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub policy_version: String,
    pub uptime_secs: u64,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub policy_version: String,
    pub policy_rules: usize,
    pub storage: &'static str,
}

/// Answer to `POST /v1/feed`: the event is queued, not yet processed.
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub event_id: EventId,
    pub queued: bool,
}

#[derive(Debug, Serialize)]
pub struct PolicyReloadResponse {
    pub policy_version: String,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            code: code.into(),
        }
    }
}
