use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::api::state::AppState;
use crate::domain::IndexStats;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub index_entries: usize,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Ready once the live index holds at least one entry.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let entries = state.rag.stats().await.entry_count;
    let response = ReadinessResponse {
        status: if entries > 0 { "ready" } else { "not_ready" }.into(),
        index_entries: entries,
    };

    if entries > 0 {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

pub async fn index_stats(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.rag.stats().await)
}
