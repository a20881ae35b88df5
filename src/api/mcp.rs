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

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::tool_registry::ToolContext;
use crate::validation;

/// GET /mcp/tools
pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "tools": state.tools.definitions(),
        "langchain_mode": true,
    }))
}

/// POST /mcp/call_tool
///
/// The body is parsed by hand rather than through an extractor so that
/// malformed payloads produce the same error shape as every other
/// validation failure.
pub async fn call_tool(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = validation::parse_json_body(&headers, &body)?;
    let (name, arguments) = validation::validate_tool_call(&payload)?;

    let context = ToolContext {
        store: state.store.clone(),
        llm: state.llm.clone(),
    };
    let result = state.tools.call(&context, &name, arguments).await?;
    Ok(Json(result))
}
