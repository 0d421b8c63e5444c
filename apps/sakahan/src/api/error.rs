//! # API Errors
//!
//! Maps engine errors onto HTTP responses. Validation failures keep their
//! per-field shape (`{"field": ["message"]}`); everything else answers
//! `{"detail": "..."}`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sakahan_core::{Error, FieldErrors};
use serde_json::json;

/// Body of every unexpected failure.
pub const INTERNAL_DETAIL: &str = "Something went wrong.";

/// Errors returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    /// An engine error.
    Core(Error),
    /// Missing or invalid credentials.
    Unauthorized(String),
    /// Too many requests.
    RateLimited,
    /// A failure outside the engine (I/O, task join).
    Internal(String),
}

impl ApiError {
    /// Shorthand for a single-field validation error.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Core(Error::invalid(field, message))
    }

    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Internal(format!("{}: {}", context, err))
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Core(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Core(Error::Validation(FieldErrors::single(
            "non_field_errors",
            rejection.body_text(),
        )))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Core(Error::Validation(FieldErrors::single(
            "query",
            rejection.body_text(),
        )))
    }
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": message.into() }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Core(Error::Validation(fields)) => {
                (StatusCode::BAD_REQUEST, Json(fields)).into_response()
            }
            Self::Core(err @ Error::InvalidTransition { .. }) => {
                let fields = FieldErrors::single("status", err.to_string());
                (StatusCode::BAD_REQUEST, Json(fields)).into_response()
            }
            Self::Core(err @ Error::NotFound { .. }) => detail(StatusCode::NOT_FOUND, err.to_string()),
            Self::Core(Error::Forbidden(message)) => detail(StatusCode::FORBIDDEN, message),
            Self::Core(Error::Protected(message)) => detail(StatusCode::CONFLICT, message),
            Self::Core(err @ (Error::Storage(_) | Error::Codec(_))) => {
                tracing::error!(error = %err, "engine failure, transaction rolled back");
                detail(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_DETAIL)
            }
            Self::Unauthorized(message) => detail(StatusCode::UNAUTHORIZED, message),
            Self::RateLimited => detail(
                StatusCode::TOO_MANY_REQUESTS,
                "Request was throttled. Try again later.",
            ),
            Self::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                detail(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_DETAIL)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (ApiError::invalid("title", "blank"), StatusCode::BAD_REQUEST),
            (ApiError::from(Error::not_found("crop", 1)), StatusCode::NOT_FOUND),
            (ApiError::from(Error::Protected("in use".into())), StatusCode::CONFLICT),
            (ApiError::from(Error::Forbidden("no".into())), StatusCode::FORBIDDEN),
            (ApiError::Unauthorized("who".into()), StatusCode::UNAUTHORIZED),
            (ApiError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (ApiError::internal("io", "disk full"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
