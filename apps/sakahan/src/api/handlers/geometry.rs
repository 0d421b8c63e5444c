//! Geometry features, served as GeoJSON. Written only through
//! contribution operations.

use crate::api::error::ApiError;
use crate::api::extract::ApiQuery;
use crate::api::views::{Feature, FeatureCollection};
use crate::api::AppState;
use axum::extract::{Path, State};
use axum::Json;
use sakahan_core::{ContributionId, GeometryFeature, Reader};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct GeometryFilter {
    pub layer: Option<String>,
    pub published: Option<bool>,
    pub contribution: Option<u64>,
}

/// GET /api/current/geometry-features
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<GeometryFilter>,
) -> Result<Json<FeatureCollection>, ApiError> {
    let features = state
        .read(move |tx| {
            tx.filter::<GeometryFeature>(|g| {
                filter.layer.as_ref().is_none_or(|layer| &g.layer == layer)
                    && filter.published.is_none_or(|published| g.published == published)
                    && filter
                        .contribution
                        .is_none_or(|id| g.reference == ContributionId(id))
            })
        })
        .await?;
    Ok(Json(FeatureCollection::new(&features)))
}

/// GET /api/current/geometry-features/{id}
pub async fn retrieve(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Feature>, ApiError> {
    let feature = state.read(move |tx| tx.require::<GeometryFeature>(id)).await?;
    Ok(Json(Feature::from(&feature)))
}
