// Copyright 2025 Userhub Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Token service and request authentication.
//!
//! Tokens are HS256 JWTs carrying user id, username, issued-at, and
//! expiry. There is no revocation list: a token is valid until its
//! encoded expiry regardless of server-side state.

pub mod rate_limit;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, AppState};

/// Token payload. Consumed (verified, never mutated) on every
/// authenticated request; no persisted representation exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verification failure reasons. Both render as 401; the distinction
/// only matters for logging.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,
}

pub struct JwtAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl JwtAuth {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }

    pub fn generate_token(&self, user_id: i64, username: &str) -> Result<String, ApiError> {
        let now = chrono::Utc::now();
        let claims = Claims {
            user_id,
            username: username.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::hours(self.ttl_hours)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {e}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, TokenError> {
        match decode::<Claims>(token, &self.decoding, &Validation::default()) {
            Ok(data) => Ok(data.claims),
            Err(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(TokenError::Expired),
                _ => Err(TokenError::Invalid),
            },
        }
    }
}

/// Who a set of credentials belongs to, if they check out.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
}

/// Pluggable credential check behind the login endpoint. The shipped
/// implementation is a static pair; hashed-password stores implement
/// the same trait.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> Option<AuthenticatedUser>;
}

pub struct StaticCredentials {
    username: String,
    password: String,
    user_id: i64,
}

impl StaticCredentials {
    pub fn new(username: String, password: String, user_id: i64) -> Self {
        Self {
            username,
            password,
            user_id,
        }
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> Option<AuthenticatedUser> {
        if username == self.username && password == self.password {
            Some(AuthenticatedUser {
                id: self.user_id,
                username: username.to_string(),
            })
        } else {
            None
        }
    }
}

/// Pull the token out of the Authorization header. A bare token without
/// the `Bearer ` prefix is accepted too.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

/// Middleware guarding token-protected routes. On success the verified
/// claims are stashed in request extensions for handlers to read.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Authorization header required".to_string()))?;

    let claims = state.jwt.verify_token(token).map_err(|err| {
        tracing::debug!("Rejected token: {err}");
        ApiError::Unauthorized(err.to_string())
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
