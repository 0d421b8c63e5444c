//! Request handlers, one module per resource.

pub mod comments;
pub mod contributions;
pub mod files;
pub mod geometry;
pub mod legacy;
pub mod levels;
pub mod taxonomy;

use super::auth::AuthUser;
use super::views::UserView;
use axum::Json;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/users/me
pub async fn me(AuthUser(user): AuthUser) -> Json<UserView> {
    Json(UserView::from(&user))
}
