//! # Authentication
//!
//! Access tokens are HS256 JWTs issued by the external token service and
//! carried in the `access` cookie or an `Authorization: Bearer` header.
//! Handlers that need a user take an [`AuthUser`] argument; the extractor
//! answers 401 when the token is missing, expired or forged.

use super::error::ApiError;
use super::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sakahan_core::{Role, User, UserId};
use serde::{Deserialize, Serialize};

use crate::config::MIN_SECRET_LEN;

/// Name of the cookie holding the access token.
pub const ACCESS_COOKIE: &str = "access";

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    /// The user these claims describe.
    pub fn user(&self) -> Result<User, ApiError> {
        let id = self
            .sub
            .parse::<u64>()
            .map_err(|_| ApiError::Unauthorized("Token contained no recognizable user identification.".to_string()))?;
        let role = self
            .role
            .parse::<Role>()
            .map_err(|_| ApiError::Unauthorized("Token carries an unknown role.".to_string()))?;
        Ok(User {
            id: UserId(id),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role,
        })
    }
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

/// Token signer and verifier.
#[derive(Clone)]
pub struct JwtAuth {
    secret: String,
}

impl std::fmt::Debug for JwtAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuth").finish_non_exhaustive()
    }
}

impl JwtAuth {
    /// Returns an error if the secret is shorter than [`MIN_SECRET_LEN`].
    pub fn new(secret: impl Into<String>) -> Result<Self, String> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(format!(
                "JWT secret must be at least {} characters",
                MIN_SECRET_LEN
            ));
        }
        Ok(Self { secret })
    }

    /// Mint a token for `user` valid for `ttl_seconds`.
    pub fn issue(&self, user: &User, ttl_seconds: u64) -> Result<String, String> {
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.as_str().to_string(),
            exp: unix_now().saturating_add(ttl_seconds),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| format!("Failed to generate token: {}", e))
    }

    /// Verify and decode a token.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|err| {
            let message = match err.kind() {
                ErrorKind::ExpiredSignature => "Token is expired.",
                ErrorKind::InvalidSignature => "Token signature is invalid.",
                _ => "Token is invalid.",
            };
            tracing::debug!(error = %err, "rejected access token");
            ApiError::Unauthorized(message.to_string())
        })
    }
}

/// Read the access token from the `Authorization` header or the cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ACCESS_COOKIE)
        .map(|(_, token)| token.to_string())
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or_else(|| {
            ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
        })?;
        let claims = state.jwt.verify(&token)?;
        claims.user().map(Self)
    }
}
