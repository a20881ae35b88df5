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

//! HTTP surface: shared state, error taxonomy, and route handlers.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{CredentialVerifier, JwtAuth};
use crate::llm::LlmBackend;
use crate::store::UserStore;
use crate::tool_registry::ToolRegistry;

mod auth_routes;
mod health;
mod mcp;

pub use auth_routes::{login, verify_token};
pub use health::health_check;
pub use mcp::{call_tool, list_tools};

/// API error type
///
/// Every variant renders as a JSON object carrying at least an `error`
/// field. Validation failures additionally carry per-field `details`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation { details: serde_json::Value },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests")]
    RateLimited { retry_after: Duration },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Validation { details } => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                Some(details),
            ),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::RateLimited { retry_after } => {
                let body = ErrorResponse {
                    error: "Too many requests".to_string(),
                    details: None,
                };
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert("Retry-After", HeaderValue::from(retry_after.as_secs()));
                return response;
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
        };

        (status, Json(ErrorResponse { error: message, details })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub llm: Arc<dyn LlmBackend>,
    pub jwt: Arc<JwtAuth>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub tools: Arc<ToolRegistry>,
}
