//! # Error Module
//!
//! The single error type of the engine. Every operation returns
//! [`Result`]; the app layer maps variants onto HTTP status codes.

use crate::types::ContributionStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more fields failed validation.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// A referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    /// The record is still referenced and cannot be deleted.
    #[error("{0}")]
    Protected(String),

    /// The acting user may not perform the operation.
    #[error("{0}")]
    Forbidden(String),

    /// The requested status change is not part of the lifecycle.
    #[error("cannot change status from {from} to {to}")]
    InvalidTransition {
        from: ContributionStatus,
        to: ContributionStatus,
    },

    /// The underlying redb database failed.
    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),

    /// A stored record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),
}

impl Error {
    /// Shorthand for a validation error on a single field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    /// Shorthand for a missing record.
    pub fn not_found(kind: &'static str, id: u64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Whether this error is caused by the request rather than the server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Codec(_))
    }
}

macro_rules! storage_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for Error {
                fn from(err: $source) -> Self {
                    Self::Storage(redb::Error::from(err))
                }
            }
        )*
    };
}

storage_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

// =============================================================================
// FIELD ERRORS
// =============================================================================

/// Validation messages keyed by field name.
///
/// Serializes as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection holding one message.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Merge another collection into this one.
    pub fn extend(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded for a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when empty, otherwise a [`Error::Validation`].
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(" "))?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        assert!(errors.is_empty());

        errors.add("name", "This field may not be blank.");
        errors.add("name", "Ensure this field has no more than 50 characters.");
        errors.add("geom", "At least one polygon is required.");

        assert_eq!(errors.get("name").map(<[String]>::len), Some(2));
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn field_errors_display_lists_fields() {
        let mut errors = FieldErrors::single("crop", "Crop name must be a string.");
        errors.add("title", "This field may not be blank.");
        assert_eq!(
            errors.to_string(),
            "crop: Crop name must be a string.; title: This field may not be blank."
        );
    }

    #[test]
    fn storage_errors_are_server_errors() {
        let err = Error::from(redb::StorageError::Corrupted("bad page".to_string()));
        assert!(!err.is_client_error());
        assert!(Error::invalid("title", "required").is_client_error());
        assert!(Error::not_found("crop", 3).is_client_error());
    }
}
