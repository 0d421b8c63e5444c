//! Comments on contributions. Every endpoint requires authentication.

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery};
use crate::api::views::{grouped_comments, CommentView};
use crate::api::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sakahan_core::{comments, Comment, CommentId, ContributionId, Reader};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
pub struct CommentFilter {
    pub contribution: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct NewComment {
    pub contribution: ContributionId,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentEdit {
    pub content: String,
}

/// GET /api/comments?contribution=
pub async fn list(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    ApiQuery(filter): ApiQuery<CommentFilter>,
) -> Result<Json<BTreeMap<String, Vec<CommentView>>>, ApiError> {
    let grouped = state
        .read(move |tx| {
            let grouped = comments::list_grouped(tx, filter.contribution.map(ContributionId))?;
            grouped_comments(tx, grouped)
        })
        .await?;
    Ok(Json(grouped))
}

/// GET /api/comments/{id}
pub async fn retrieve(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<u64>,
) -> Result<Json<CommentView>, ApiError> {
    let view = state
        .read(move |tx| {
            let comment = tx.require::<Comment>(id)?;
            CommentView::load(tx, &comment)
        })
        .await?;
    Ok(Json(view))
}

/// POST /api/comments
pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<NewComment>,
) -> Result<(StatusCode, Json<CommentView>), ApiError> {
    let view = state
        .write(move |tx| {
            let comment = comments::create(tx, body.contribution, &user, &body.content, Utc::now())?;
            CommentView::load(&*tx, &comment)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// PATCH /api/comments/{id}
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<u64>,
    ApiJson(body): ApiJson<CommentEdit>,
) -> Result<Json<CommentView>, ApiError> {
    let view = state
        .write(move |tx| {
            let comment = comments::update(tx, CommentId(id), &user, &body.content)?;
            CommentView::load(&*tx, &comment)
        })
        .await?;
    Ok(Json(view))
}

/// DELETE /api/comments/{id}
pub async fn destroy(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state
        .write(move |tx| comments::delete(tx, CommentId(id), &user))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
