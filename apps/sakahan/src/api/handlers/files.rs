//! PDF attachments.
//!
//! `POST /api/files?contribution=` takes the complete list of attachments
//! the client wants to keep. Entries whose identifier is already stored are
//! kept as-is; new entries carry their content as base64. Blobs are written
//! before the transaction and removed again if it fails; blobs of dropped
//! attachments are removed after commit.

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery};
use crate::api::views::FileView;
use crate::api::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use sakahan_core::files::{self, validate_upload};
use sakahan_core::{ContributionId, Error, FieldErrors, FileId, FileRecord, FileUpload, Reader};
use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Debug, Default, Deserialize)]
pub struct FileFilter {
    pub contribution: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    pub contribution: Option<u64>,
    pub user: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FileEntry {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub content_type: Option<String>,
    /// Base64 content, optionally as a `data:` URL. Required for new files.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileSyncBody {
    pub files: Vec<FileEntry>,
}

fn decode_content(raw: &str) -> Option<Vec<u8>> {
    let payload = match raw.split_once(";base64,") {
        Some((_, data)) => data,
        None => raw,
    };
    STANDARD.decode(payload.trim()).ok()
}

/// GET /api/files?contribution=
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<FileFilter>,
) -> Result<Json<Vec<FileView>>, ApiError> {
    let records = state
        .read(move |tx| files::list(tx, filter.contribution.map(ContributionId)))
        .await?;
    Ok(Json(records.into_iter().map(FileView::from).collect()))
}

/// GET /api/files/{id}
pub async fn retrieve(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<FileView>, ApiError> {
    let record = state.read(move |tx| tx.require::<FileRecord>(id)).await?;
    Ok(Json(FileView::from(record)))
}

/// POST /api/files?contribution=&user=
pub async fn sync(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(params): ApiQuery<SyncParams>,
    ApiJson(body): ApiJson<FileSyncBody>,
) -> Result<(StatusCode, Json<Vec<FileView>>), ApiError> {
    let contribution = params
        .contribution
        .map(ContributionId)
        .ok_or_else(|| ApiError::invalid("contribution", "This query parameter is required."))?;
    if params.user.is_some_and(|id| id != user.id.0) {
        return Err(Error::Forbidden("Files can only be uploaded as yourself.".to_string()).into());
    }

    let stored: BTreeSet<String> = state
        .read(move |tx| {
            Ok(tx
                .filter::<FileRecord>(|f| f.contribution == contribution)?
                .into_iter()
                .map(|f| f.file_identifier)
                .collect())
        })
        .await?;

    let mut keep = Vec::new();
    let mut uploads = Vec::new();
    let mut blobs = Vec::new();
    let mut errors = FieldErrors::new();
    for entry in body.files {
        if stored.contains(&entry.identifier) {
            keep.push(entry.identifier);
            continue;
        }
        let Some(bytes) = entry.content.as_deref().and_then(decode_content) else {
            errors.add(
                "file",
                format!("No valid file content submitted for \"{}\".", entry.identifier),
            );
            continue;
        };
        let upload = FileUpload {
            name: entry
                .name
                .unwrap_or_else(|| format!("{}.pdf", entry.identifier)),
            identifier: entry.identifier,
            size: bytes.len() as u64,
            content_type: entry.content_type.unwrap_or_default(),
        };
        validate_upload(&upload, &mut errors);
        blobs.push((files::storage_path(contribution, &upload.identifier, &upload.name), bytes));
        uploads.push(upload);
    }
    errors.into_result()?;

    let mut written = Vec::new();
    for (path, bytes) in &blobs {
        if let Err(err) = state.media.save(path, bytes).await {
            state.media.remove_all(written.iter().map(String::as_str)).await;
            return Err(ApiError::internal("failed to store attachment", err));
        }
        written.push(path.clone());
    }

    let outcome = state
        .write(move |tx| files::sync(tx, contribution, &user, &keep, &uploads, Utc::now()))
        .await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            state.media.remove_all(written.iter().map(String::as_str)).await;
            return Err(err);
        }
    };

    let paths: Vec<&str> = outcome.removed.iter().map(|f| f.path.as_str()).collect();
    state.media.remove_all(paths).await;
    let created = outcome.created.into_iter().map(FileView::from).collect();
    Ok((StatusCode::CREATED, Json(created)))
}

/// DELETE /api/files/{id}
pub async fn destroy(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let record = state
        .write(move |tx| files::delete(tx, FileId(id), &user))
        .await?;
    state.media.remove_all([record.path.as_str()]).await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /media/{*path}
///
/// Only paths recorded by an attachment are served.
pub async fn download(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let lookup = path.clone();
    let record = state
        .read(move |tx| tx.find::<FileRecord>(|f| f.path == lookup))
        .await?
        .ok_or_else(|| ApiError::from(Error::not_found("file", 0)))?;

    let bytes = match tokio::fs::read(state.media.resolve(&record.path)).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found("file", record.id.0).into());
        }
        Err(err) => return Err(ApiError::internal("failed to read attachment", err)),
    };
    let disposition = format!("inline; filename=\"{}\"", record.file_name.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, record.file_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
