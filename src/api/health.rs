use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Ready once the store answers; reports the live connection alongside.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let subscriber = state.subscriber.state();
    match state.pipeline.repo().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"status": "ready", "subscriber": subscriber})),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "subscriber": subscriber})),
            )
        }
    }
}
