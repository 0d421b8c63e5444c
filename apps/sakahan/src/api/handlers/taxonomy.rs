//! Crops and crop elements.
//!
//! Reads are public; writes need an authenticated user. Renaming a published
//! record is refused and deleting a referenced one answers 409.

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery};
use crate::api::views::{CropView, ElementView};
use crate::api::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sakahan_core::{taxonomy, Crop, CropElement, CropElementId, CropId, CropPatch, ElementPatch, Reader};
use serde::Deserialize;

// =============================================================================
// CROPS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct NewCrop {
    pub name: String,
}

/// GET /api/current/crops
pub async fn list_crops(State(state): State<AppState>) -> Result<Json<Vec<CropView>>, ApiError> {
    let crops = state.read(|tx| taxonomy::list_crops(tx)).await?;
    Ok(Json(crops.iter().map(CropView::from).collect()))
}

/// GET /api/current/crops/{id}
pub async fn retrieve_crop(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<CropView>, ApiError> {
    let crop = state.read(move |tx| tx.require::<Crop>(id)).await?;
    Ok(Json(CropView::from(&crop)))
}

/// POST /api/current/crops
pub async fn create_crop(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<NewCrop>,
) -> Result<(StatusCode, Json<CropView>), ApiError> {
    let crop = state
        .write(move |tx| taxonomy::create_crop(tx, &body.name))
        .await?;
    tracing::debug!(crop = %crop.id, user = %user.id, "crop created via API");
    Ok((StatusCode::CREATED, Json(CropView::from(&crop))))
}

/// PATCH /api/current/crops/{id}
pub async fn update_crop(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<u64>,
    ApiJson(patch): ApiJson<CropPatch>,
) -> Result<Json<CropView>, ApiError> {
    let crop = state
        .write(move |tx| taxonomy::update_crop(tx, CropId(id), patch))
        .await?;
    Ok(Json(CropView::from(&crop)))
}

/// DELETE /api/current/crops/{id}
pub async fn delete_crop(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state
        .write(move |tx| taxonomy::delete_crop(tx, CropId(id)))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// CROP ELEMENTS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct NewElement {
    pub name: String,
    pub category: CropId,
}

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    pub category: Option<u64>,
}

fn element_views(r: &impl Reader, elements: &[CropElement]) -> sakahan_core::Result<Vec<ElementView>> {
    elements.iter().map(|element| ElementView::load(r, element)).collect()
}

/// GET /api/current/crops-elements
pub async fn list_elements(State(state): State<AppState>) -> Result<Json<Vec<ElementView>>, ApiError> {
    let views = state
        .read(|tx| {
            let elements = taxonomy::list_elements(tx, None)?;
            element_views(tx, &elements)
        })
        .await?;
    Ok(Json(views))
}

/// GET /api/current/crops-elements/category?category=
pub async fn elements_by_category(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CategoryQuery>,
) -> Result<Json<Vec<ElementView>>, ApiError> {
    let category = query
        .category
        .ok_or_else(|| ApiError::invalid("category", "Category parameter is required."))?;
    let views = state
        .read(move |tx| {
            let elements = taxonomy::list_elements(tx, Some(CropId(category)))?;
            element_views(tx, &elements)
        })
        .await?;
    Ok(Json(views))
}

/// GET /api/current/crops-elements/{id}
pub async fn retrieve_element(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ElementView>, ApiError> {
    let view = state
        .read(move |tx| {
            let element = tx.require::<CropElement>(id)?;
            ElementView::load(tx, &element)
        })
        .await?;
    Ok(Json(view))
}

/// POST /api/current/crops-elements
pub async fn create_element(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    ApiJson(body): ApiJson<NewElement>,
) -> Result<(StatusCode, Json<ElementView>), ApiError> {
    let view = state
        .write(move |tx| {
            let element = taxonomy::create_element(tx, &body.name, body.category)?;
            ElementView::load(&*tx, &element)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// PATCH /api/current/crops-elements/{id}
pub async fn update_element(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<u64>,
    ApiJson(patch): ApiJson<ElementPatch>,
) -> Result<Json<ElementView>, ApiError> {
    let view = state
        .write(move |tx| {
            let element = taxonomy::update_element(tx, CropElementId(id), patch)?;
            ElementView::load(&*tx, &element)
        })
        .await?;
    Ok(Json(view))
}

/// DELETE /api/current/crops-elements/{id}
pub async fn delete_element(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state
        .write(move |tx| taxonomy::delete_element(tx, CropElementId(id)))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
