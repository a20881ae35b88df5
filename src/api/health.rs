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

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use super::AppState;

/// GET /health
///
/// The database is load-bearing: if it cannot be reached the service is
/// unhealthy and the endpoint returns 500. The LLM backend is probed
/// too but only reported, never failed on.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(err) = state.store.ping().await {
        tracing::error!(error = %err, "Health check failed: database unreachable");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "unhealthy",
                "error": err.to_string(),
            })),
        );
    }

    let ollama = match state.llm.ask("test").await {
        Ok(_) => "connected",
        Err(err) => {
            tracing::warn!(error = %err, "Health check: LLM backend unavailable");
            "unavailable"
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "database": "connected",
            "ollama": ollama,
            "langchain_mode": true,
        })),
    )
}
