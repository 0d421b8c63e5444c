//! Suitability levels (read-only).

use crate::api::error::ApiError;
use crate::api::AppState;
use axum::extract::{Path, State};
use axum::Json;
use sakahan_core::{suitability, Reader, SuitabilityLevel};

/// GET /api/suitability-levels
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<SuitabilityLevel>>, ApiError> {
    let levels = state.read(|tx| suitability::list(tx)).await?;
    Ok(Json(levels))
}

/// GET /api/suitability-levels/{id}
pub async fn retrieve(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<SuitabilityLevel>, ApiError> {
    let level = state.read(move |tx| tx.require::<SuitabilityLevel>(id)).await?;
    Ok(Json(level))
}
