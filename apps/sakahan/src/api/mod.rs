//! # HTTP API
//!
//! REST endpoints under `/api`, built on axum.
//!
//! ## Layers
//!
//! - `TraceLayer` logs every request through `tracing`.
//! - A global `governor` rate limiter answers 429 when exceeded.
//! - CORS is restricted to the configured origin, or permissive if none.
//!
//! ## Transactions
//!
//! Handlers run engine operations through [`AppState::write`] and
//! [`AppState::read`], which execute one redb transaction on the blocking
//! pool. A write commits only if the whole operation succeeds.

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod media;
pub mod views;

use auth::JwtAuth;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::Router;
use error::ApiError;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use media::MediaStore;
use sakahan_core::{ReadTx, Store, WriteTx};
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// STATE
// =============================================================================

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub jwt: Arc<JwtAuth>,
    pub media: Arc<MediaStore>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl AppState {
    /// `rate_limit` is requests per second; zero is treated as one.
    pub fn new(store: Store, jwt: JwtAuth, media: MediaStore, rate_limit: u32) -> Self {
        let per_second = NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN);
        Self {
            store: Arc::new(store),
            jwt: Arc::new(jwt),
            media: Arc::new(media),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        }
    }

    /// Run a read-only closure against a snapshot.
    pub async fn read<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&ReadTx) -> sakahan_core::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let outcome = tokio::task::spawn_blocking(move || store.read(f))
            .await
            .map_err(|e| ApiError::internal("read task failed", e))?;
        Ok(outcome?)
    }

    /// Run a closure inside one write transaction.
    pub async fn write<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriteTx) -> sakahan_core::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let outcome = tokio::task::spawn_blocking(move || store.write(f))
            .await
            .map_err(|e| ApiError::internal("write task failed", e))?;
        if let Err(err) = &outcome {
            if err.is_client_error() {
                tracing::debug!(error = %err, "write rejected, transaction rolled back");
            }
        }
        Ok(outcome?)
    }
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.limiter.check().is_err() {
        tracing::warn!(path = %request.uri().path(), "rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }
    next.run(request).await
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let Some(origin) = origin else {
        return CorsLayer::permissive();
    };
    match HeaderValue::from_str(origin) {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
        Err(err) => {
            tracing::warn!(origin, error = %err, "invalid CORS origin, falling back to permissive");
            CorsLayer::permissive()
        }
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Build the application router.
pub fn create_router(state: AppState, cors_origin: Option<&str>) -> Router {
    use handlers::{comments, contributions, files, geometry, legacy, levels, taxonomy};

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/users/me", get(handlers::me))
        .route("/api/suitability-levels", get(levels::list))
        .route("/api/suitability-levels/{id}", get(levels::retrieve))
        .route("/api/legacy/crops", get(legacy::list_crops))
        .route("/api/legacy/crops/{id}", get(legacy::retrieve_crop))
        .route("/api/legacy/crops-elements", get(legacy::list_elements))
        .route("/api/legacy/crops-elements/{id}", get(legacy::retrieve_element))
        .route(
            "/api/current/crops",
            get(taxonomy::list_crops).post(taxonomy::create_crop),
        )
        .route(
            "/api/current/crops/{id}",
            get(taxonomy::retrieve_crop)
                .patch(taxonomy::update_crop)
                .delete(taxonomy::delete_crop),
        )
        .route(
            "/api/current/crops-elements",
            get(taxonomy::list_elements).post(taxonomy::create_element),
        )
        .route(
            "/api/current/crops-elements/category",
            get(taxonomy::elements_by_category),
        )
        .route(
            "/api/current/crops-elements/{id}",
            get(taxonomy::retrieve_element)
                .patch(taxonomy::update_element)
                .delete(taxonomy::delete_element),
        )
        .route("/api/current/geometry-features", get(geometry::list))
        .route("/api/current/geometry-features/{id}", get(geometry::retrieve))
        .route(
            "/api/contributions",
            get(contributions::list).post(contributions::create),
        )
        .route(
            "/api/contributions/{id}",
            get(contributions::retrieve)
                .put(contributions::update)
                .delete(contributions::destroy),
        )
        .route("/api/contributions/{id}/status", patch(contributions::set_status))
        .route("/api/comments", get(comments::list).post(comments::create))
        .route(
            "/api/comments/{id}",
            get(comments::retrieve)
                .patch(comments::update)
                .delete(comments::destroy),
        )
        .route("/api/files", get(files::list).post(files::sync))
        .route("/api/files/{id}", get(files::retrieve).delete(files::destroy))
        .route("/media/{*path}", get(files::download))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
