//! Legacy crop list (read-only, public, unpaginated).

use crate::api::error::ApiError;
use crate::api::views::{LegacyCropView, LegacyElementView};
use crate::api::AppState;
use axum::extract::{Path, State};
use axum::Json;
use sakahan_core::{legacy, LegacyCrop, Reader};

/// GET /api/legacy/crops
pub async fn list_crops(
    State(state): State<AppState>,
) -> Result<Json<Vec<LegacyCropView>>, ApiError> {
    let crops = state.read(|tx| legacy::crops(tx)).await?;
    Ok(Json(crops.iter().map(LegacyCropView::from).collect()))
}

/// GET /api/legacy/crops/{id}
pub async fn retrieve_crop(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<LegacyCropView>, ApiError> {
    let crop = state.read(move |tx| tx.require::<LegacyCrop>(id)).await?;
    Ok(Json(LegacyCropView::from(&crop)))
}

/// GET /api/legacy/crops-elements
pub async fn list_elements(
    State(state): State<AppState>,
) -> Result<Json<Vec<LegacyElementView>>, ApiError> {
    let elements = state.read(|tx| legacy::elements(tx)).await?;
    Ok(Json(
        elements
            .iter()
            .map(|(element, category)| LegacyElementView::new(element, category))
            .collect(),
    ))
}

/// GET /api/legacy/crops-elements/{id}
pub async fn retrieve_element(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<LegacyElementView>, ApiError> {
    let (element, category) = state.read(move |tx| legacy::element(tx, id)).await?;
    Ok(Json(LegacyElementView::new(&element, &category)))
}
