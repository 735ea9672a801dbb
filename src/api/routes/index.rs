use axum::{extract::State, Json};

use crate::api::{error::ApiError, state::AppState};
use crate::domain::IndexStats;

/// Reloads the persisted snapshot and swaps it in. In-flight questions finish
/// against the index they started with.
pub async fn reload_index(State(state): State<AppState>) -> Result<Json<IndexStats>, ApiError> {
    let indexer = state
        .indexer
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("index reloading is not enabled"))?;

    let stats = indexer.reload().await?;
    tracing::info!(entries = stats.entry_count, "index reloaded via API");
    Ok(Json(stats))
}
