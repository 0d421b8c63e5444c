//! # Attachments
//!
//! PDF attachments of a contribution, synchronised as a set keyed by a
//! client-chosen identifier. This module owns the metadata records only;
//! the app layer writes and removes the blobs at the paths computed here.

use crate::error::{Error, FieldErrors, Result};
use crate::primitives::{
    ContributionId, FileId, MAX_FILES_PER_CONTRIBUTION, MAX_FILE_SIZE, PDF_CONTENT_TYPE,
};
use crate::storage::{Reader, WriteTx};
use crate::types::{Contribution, FileRecord, User};
use crate::users;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// A new attachment announced by the client; the blob is already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub identifier: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

/// Outcome of [`sync`].
#[derive(Debug, Clone, Default)]
pub struct FileSync {
    pub created: Vec<FileRecord>,
    pub kept: Vec<FileRecord>,
    pub removed: Vec<FileRecord>,
}

/// Keep `[A-Za-z0-9._-]`, replace everything else with `_`.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "attachment.pdf".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Reversible encoding of an identifier into `[A-Za-z0-9.]` plus `_`
/// escapes: `_` becomes `__`, any other byte becomes `_` and two hex digits.
/// Distinct identifiers never share an encoding, and the output holds no
/// `-`, so the first `-` of a storage path file name ends the identifier.
fn escape_identifier(identifier: &str) -> String {
    let mut escaped = String::with_capacity(identifier.len());
    for byte in identifier.bytes() {
        match byte {
            b'_' => escaped.push_str("__"),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' => escaped.push(char::from(byte)),
            other => escaped.push_str(&format!("_{:02x}", other)),
        }
    }
    escaped
}

/// Relative storage path of an attachment blob.
///
/// Unique per `(contribution, identifier)`; the display name only adds a
/// readable suffix.
#[must_use]
pub fn storage_path(contribution: ContributionId, identifier: &str, name: &str) -> String {
    format!(
        "contributions/{}/pdfs/{}-{}",
        contribution,
        escape_identifier(identifier),
        sanitize(name)
    )
}

/// Check type, size and naming of one upload.
pub fn validate_upload(upload: &FileUpload, errors: &mut FieldErrors) {
    if upload.identifier.trim().is_empty() {
        errors.add("identifier", "This field may not be blank.");
    }
    if upload.name.trim().is_empty() {
        errors.add("file", "The submitted file has no name.");
    }
    if upload.content_type != PDF_CONTENT_TYPE {
        errors.add(
            "file",
            format!("{}: only PDF files are allowed.", upload.name),
        );
    }
    if upload.size > MAX_FILE_SIZE {
        errors.add(
            "file",
            format!("{}: file size must not exceed 5 MB.", upload.name),
        );
    }
}

/// Attachments of a contribution, or all attachments, newest first.
pub fn list(r: &impl Reader, contribution: Option<ContributionId>) -> Result<Vec<FileRecord>> {
    let mut files = match contribution {
        Some(id) => r.filter::<FileRecord>(|f| f.contribution == id)?,
        None => r.scan::<FileRecord>()?,
    };
    files.sort_by(|a, b| b.date_uploaded.cmp(&a.date_uploaded).then(b.id.cmp(&a.id)));
    Ok(files)
}

/// Synchronise the attachment set of a contribution.
///
/// `keep` lists identifiers the client wants to retain; `uploads` are new
/// files. Stored files named in neither are removed, unless both lists are
/// empty (a no-op sync). The final set may hold at most
/// [`MAX_FILES_PER_CONTRIBUTION`] files.
pub fn sync(
    tx: &mut WriteTx,
    contribution: ContributionId,
    uploader: &User,
    keep: &[String],
    uploads: &[FileUpload],
    now: DateTime<Utc>,
) -> Result<FileSync> {
    if tx.get::<Contribution>(contribution.0)?.is_none() {
        return Err(Error::invalid(
            "contribution",
            format!("Invalid pk \"{}\" - object does not exist.", contribution),
        ));
    }

    let mut errors = FieldErrors::new();
    let mut seen = BTreeSet::new();
    for upload in uploads {
        validate_upload(upload, &mut errors);
        if !seen.insert(upload.identifier.as_str()) {
            errors.add(
                "identifier",
                format!("Duplicate identifier \"{}\".", upload.identifier),
            );
        }
    }
    errors.into_result()?;

    let stored = tx.filter::<FileRecord>(|f| f.contribution == contribution)?;
    let wanted: BTreeSet<&str> = keep
        .iter()
        .map(String::as_str)
        .chain(uploads.iter().map(|u| u.identifier.as_str()))
        .collect();

    let mut outcome = FileSync::default();
    for file in stored {
        if wanted.is_empty() || wanted.contains(file.file_identifier.as_str()) {
            outcome.kept.push(file);
        } else {
            outcome.removed.push(file);
        }
    }

    let fresh: Vec<&FileUpload> = uploads
        .iter()
        .filter(|u| !outcome.kept.iter().any(|f| f.file_identifier == u.identifier))
        .collect();
    let total = outcome.kept.len().saturating_add(fresh.len());
    if total > MAX_FILES_PER_CONTRIBUTION {
        return Err(Error::invalid(
            "file",
            format!(
                "A contribution can have at most {} files.",
                MAX_FILES_PER_CONTRIBUTION
            ),
        ));
    }

    users::remember(tx, uploader)?;
    for file in &outcome.removed {
        tx.delete::<FileRecord>(file.id.0)?;
    }
    for upload in fresh {
        let record = FileRecord {
            id: FileId(tx.next_id::<FileRecord>()?),
            contribution,
            uploaded_by: uploader.id,
            file_identifier: upload.identifier.clone(),
            file_name: upload.name.clone(),
            file_size: upload.size,
            file_type: upload.content_type.clone(),
            path: storage_path(contribution, &upload.identifier, &upload.name),
            date_uploaded: now,
        };
        tx.put(&record)?;
        outcome.created.push(record);
    }

    tracing::info!(
        contribution = %contribution,
        created = outcome.created.len(),
        kept = outcome.kept.len(),
        removed = outcome.removed.len(),
        "synchronised attachments"
    );
    Ok(outcome)
}

/// Delete one attachment. Only its uploader, the contribution author or an
/// administrator may do so.
pub fn delete(tx: &mut WriteTx, id: FileId, actor: &User) -> Result<FileRecord> {
    let file = tx.require::<FileRecord>(id.0)?;
    let author = tx.get::<Contribution>(file.contribution.0)?.map(|c| c.author);
    if file.uploaded_by != actor.id && author != Some(actor.id) && !actor.is_admin() {
        return Err(Error::Forbidden(
            "Only the uploader or an administrator can delete this file.".to_string(),
        ));
    }
    tx.delete::<FileRecord>(id.0)?;
    tracing::info!(file = %id, contribution = %file.contribution, "deleted attachment");
    Ok(file)
}
