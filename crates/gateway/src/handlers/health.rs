//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::Instant;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub checks: ReadyChecks,
}

#[derive(Serialize)]
pub struct ReadyChecks {
    pub database: CheckResult,
    pub embedding: CheckResult,
    pub completion: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn up(latency_ms: Option<u64>) -> Self {
        Self { status: "up", latency_ms, error: None }
    }

    fn down(error: String) -> Self {
        Self { status: "down", latency_ms: None, error: Some(error) }
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: vejovis_common::VERSION,
    })
}

/// Readiness probe. Only the database gates readiness; a provider without
/// credentials is reported but chat failures are surfaced per request.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let start = Instant::now();

    let database = match state.corpus.ping().await {
        Ok(()) => CheckResult::up(Some(start.elapsed().as_millis() as u64)),
        Err(e) => CheckResult::down(e.to_string()),
    };
    let embedding = match state.embedder {
        Ok(_) => CheckResult::up(None),
        Err(ref message) => CheckResult::down(message.clone()),
    };
    let completion = match state.completion {
        Ok(_) => CheckResult::up(None),
        Err(ref message) => CheckResult::down(message.clone()),
    };

    let (status, code) = if database.is_up() {
        ("ready", StatusCode::OK)
    } else {
        ("not_ready", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(ReadyResponse {
            status,
            checks: ReadyChecks {
                database,
                embedding,
                completion,
            },
        }),
    )
}
