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

use axum::{body::Bytes, extract::State, http::HeaderMap, Extension, Json};
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::auth::Claims;
use crate::validation;

/// POST /auth/login
///
/// Exchanges a username/password pair for a signed bearer token. The
/// failure message is identical for unknown users and wrong passwords.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = validation::parse_json_body(&headers, &body)?;
    let (username, password) = validation::validate_login(&payload)?;

    let user = state
        .credentials
        .verify(&username, &password)
        .ok_or_else(|| {
            tracing::warn!(username = %username, "Failed login attempt");
            ApiError::Unauthorized("Invalid credentials".to_string())
        })?;

    let token = state.jwt.generate_token(user.id, &user.username)?;
    tracing::info!(username = %user.username, "Login succeeded");

    Ok(Json(json!({
        "token": token,
        "user": {
            "id": user.id,
            "username": user.username,
        }
    })))
}

/// GET /auth/verify
///
/// Reflects the claims the auth middleware already validated. Reaching
/// this handler at all means the token was good.
pub async fn verify_token(Extension(claims): Extension<Claims>) -> Json<Value> {
    Json(json!({
        "valid": true,
        "user": claims,
    }))
}
