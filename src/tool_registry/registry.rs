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

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::handlers;
use crate::api::ApiError;
use crate::llm::LlmBackend;
use crate::store::UserStore;

/// What a handler gets to work with.
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn UserStore>,
    pub llm: Arc<dyn LlmBackend>,
}

/// Discovery listing entry: name, description, and input schema.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Uniform handler signature: arguments in, JSON result or error out.
type ToolHandler =
    for<'a> fn(&'a ToolContext, Map<String, Value>) -> BoxFuture<'a, Result<Value, ApiError>>;

struct ToolEntry {
    definition: ToolDefinition,
    handler: ToolHandler,
}

/// Static name-keyed registry. Lookup is O(1); listing preserves
/// registration order.
pub struct ToolRegistry {
    entries: HashMap<&'static str, ToolEntry>,
    order: Vec<&'static str>,
}

impl ToolRegistry {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn register(&mut self, definition: ToolDefinition, handler: ToolHandler) {
        let name = definition.name;
        self.entries.insert(name, ToolEntry { definition, handler });
        self.order.push(name);
    }

    /// The six built-in tools.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        for (definition, handler) in handlers::builtin_tools() {
            registry.register(definition, handler);
        }
        registry
    }

    /// Definitions in registration order, for the discovery endpoint.
    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|entry| &entry.definition))
            .collect()
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.order.clone()
    }

    /// Dispatch a call. Handler failures are converted here: anything a
    /// handler did not already classify comes back as an internal error
    /// carrying the failure's message.
    pub async fn call(
        &self,
        context: &ToolContext,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, ApiError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown tool: {name}")))?;

        tracing::debug!(tool = name, "Dispatching tool call");
        (entry.handler)(context, arguments).await
    }
}
