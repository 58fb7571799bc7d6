// HTTP route handlers for the Codegrade API

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use codegrade_engine::testcase::parse_value;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub source_code: String,
    /// Test case specification: embedded JSON, a JSON-encoded string, or absent
    #[serde(default)]
    pub test_cases: Option<Value>,
}

/// POST /evaluate - Grade a submission synchronously
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EvaluateRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    let result = match payload.test_cases {
        Some(Value::String(spec)) => state.pool.evaluate(&payload.source_code, Some(&spec)).await,
        Some(value) => {
            state
                .pool
                .evaluate_cases(&payload.source_code, parse_value(value))
                .await
        }
        None => state.pool.evaluate(&payload.source_code, None).await,
    };
    let seconds = start.elapsed().as_secs_f64();

    match result {
        Ok(evaluation) => {
            info!(
                request_id = %request_id,
                outcome = %evaluation.outcome(),
                passed = evaluation.passed_count(),
                total = evaluation.total_count(),
                "Submission graded"
            );
            metrics::record_evaluation(&evaluation, seconds);
            (StatusCode::OK, Json(evaluation)).into_response()
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Grading engine unusable");
            metrics::record_internal_error(seconds);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": e.kind(),
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// GET /status - Health check, reflects the boot-time toolchain probe
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    match &state.toolchain {
        Ok(version) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "toolchain": version,
            })),
        )
            .into_response(),
        Err(message) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "message": message,
            })),
        )
            .into_response(),
    }
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
