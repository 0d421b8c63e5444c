//! Contributions: listing, create, edit, destroy and review.

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery};
use crate::api::views::ContributionView;
use crate::api::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sakahan_core::contribution::{self, parse_status_filter};
use sakahan_core::{
    Contribution, ContributionDraft, ContributionId, ContributionQuery, ContributionStatus, Page,
    Reader, Tab, UserId, DEFAULT_PAGE_SIZE,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub tab: Option<String>,
    pub user: Option<u64>,
    pub filter: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl ListParams {
    fn into_query(self) -> Result<ContributionQuery, ApiError> {
        let tab = self.tab.as_deref().map(str::parse::<Tab>).transpose()?;
        let status = match self.filter.as_deref() {
            Some(raw) => parse_status_filter(raw)?,
            None => None,
        };
        Ok(ContributionQuery {
            tab,
            user: self.user.map(UserId),
            status,
            page: self.page.unwrap_or(1),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }
}

/// The status of a review request, by name or numeric code.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Code(u8),
    Name(String),
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: StatusValue,
}

impl StatusChange {
    fn status(&self) -> Result<ContributionStatus, ApiError> {
        let parsed = match &self.status {
            StatusValue::Code(code) => ContributionStatus::from_code(*code)
                .ok_or_else(|| format!("\"{}\" is not a valid status.", code)),
            StatusValue::Name(name) => name.parse::<ContributionStatus>(),
        };
        parsed.map_err(|message| ApiError::invalid("status", message))
    }
}

/// GET /api/contributions
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Page<ContributionView>>, ApiError> {
    let query = params.into_query()?;
    let page = state
        .read(move |tx| {
            contribution::list(tx, &query)?.try_map(|c| ContributionView::load(tx, &c))
        })
        .await?;
    Ok(Json(page))
}

/// GET /api/contributions/{id}
pub async fn retrieve(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ContributionView>, ApiError> {
    let view = state
        .read(move |tx| {
            let contribution = tx.require::<Contribution>(id)?;
            ContributionView::load(tx, &contribution)
        })
        .await?;
    Ok(Json(view))
}

/// POST /api/contributions
pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(draft): ApiJson<ContributionDraft>,
) -> Result<(StatusCode, Json<ContributionView>), ApiError> {
    let view = state
        .write(move |tx| {
            let created = contribution::create(tx, &user, draft, Utc::now())?;
            ContributionView::load(&*tx, &created)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// PUT /api/contributions/{id}
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<u64>,
    ApiJson(draft): ApiJson<ContributionDraft>,
) -> Result<Json<ContributionView>, ApiError> {
    let view = state
        .write(move |tx| {
            let updated = contribution::update(tx, ContributionId(id), &user, draft, Utc::now())?;
            ContributionView::load(&*tx, &updated)
        })
        .await?;
    Ok(Json(view))
}

/// DELETE /api/contributions/{id}
pub async fn destroy(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let destroyed = state
        .write(move |tx| contribution::destroy(tx, ContributionId(id), &user))
        .await?;
    let paths: Vec<&str> = destroyed.files.iter().map(|f| f.path.as_str()).collect();
    state.media.remove_all(paths).await;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/contributions/{id}/status
pub async fn set_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<u64>,
    ApiJson(change): ApiJson<StatusChange>,
) -> Result<Json<ContributionView>, ApiError> {
    let status = change.status()?;
    let view = state
        .write(move |tx| {
            let reviewed =
                contribution::set_status(tx, ContributionId(id), status, &user, Utc::now())?;
            ContributionView::load(&*tx, &reviewed)
        })
        .await?;
    Ok(Json(view))
}
