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

//! The six built-in tool handlers and their discovery schemas.

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use super::registry::{ToolContext, ToolDefinition};
use crate::api::ApiError;
use crate::llm::{answer_question, AnswerError};
use crate::store::StoreError;
use crate::validation;

type HandlerFn =
    for<'a> fn(&'a ToolContext, Map<String, Value>) -> BoxFuture<'a, Result<Value, ApiError>>;

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("User not found".to_string()),
            StoreError::Conflict(detail) => {
                ApiError::Conflict(format!("Username or email already exists: {detail}"))
            }
            StoreError::EmptyUpdate => ApiError::BadRequest("No fields to update".to_string()),
            StoreError::Backend(detail) => ApiError::Internal(detail),
        }
    }
}

pub(super) fn builtin_tools() -> Vec<(ToolDefinition, HandlerFn)> {
    vec![
        (
            ToolDefinition {
                name: "insert_user",
                description: "Insert a new user into the database",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "username": {"type": "string", "description": "Unique username"},
                        "email": {"type": "string", "description": "User's email address"},
                        "first_name": {"type": "string", "description": "User's first name (optional)"},
                        "last_name": {"type": "string", "description": "User's last name (optional)"}
                    },
                    "required": ["username", "email"]
                }),
            },
            insert_user,
        ),
        (
            ToolDefinition {
                name: "get_users",
                description: "Get all users from the database",
                input_schema: json!({"type": "object", "properties": {}}),
            },
            get_users,
        ),
        (
            ToolDefinition {
                name: "get_user_by_id",
                description: "Get a specific user by ID",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {"type": "integer", "description": "The ID of the user to retrieve"}
                    },
                    "required": ["user_id"]
                }),
            },
            get_user_by_id,
        ),
        (
            ToolDefinition {
                name: "update_user",
                description: "Update an existing user",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {"type": "integer", "description": "The ID of the user to update"},
                        "username": {"type": "string", "description": "New username (optional)"},
                        "email": {"type": "string", "description": "New email (optional)"},
                        "first_name": {"type": "string", "description": "New first name (optional)"},
                        "last_name": {"type": "string", "description": "New last name (optional)"}
                    },
                    "required": ["user_id"]
                }),
            },
            update_user,
        ),
        (
            ToolDefinition {
                name: "delete_user",
                description: "Delete a user from the database",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {"type": "integer", "description": "The ID of the user to delete"}
                    },
                    "required": ["user_id"]
                }),
            },
            delete_user,
        ),
        (
            ToolDefinition {
                name: "query_with_llm",
                description: "Query the database using natural language with LLM assistance",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Natural language query about the database"}
                    },
                    "required": ["query"]
                }),
            },
            query_with_llm,
        ),
    ]
}

fn insert_user<'a>(
    cx: &'a ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'a, Result<Value, ApiError>> {
    Box::pin(async move {
        let new = validation::validate_insert_args(&args)?;
        let user = cx.store.insert(new).await?;
        Ok(json!({"success": true, "user": user}))
    })
}

fn get_users<'a>(
    cx: &'a ToolContext,
    _args: Map<String, Value>,
) -> BoxFuture<'a, Result<Value, ApiError>> {
    Box::pin(async move {
        let users = cx.store.list().await?;
        Ok(json!({"users": users}))
    })
}

fn get_user_by_id<'a>(
    cx: &'a ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'a, Result<Value, ApiError>> {
    Box::pin(async move {
        let id = validation::validate_user_id(&args)?;
        let user = cx.store.get(id).await?;
        Ok(json!({"user": user}))
    })
}

fn update_user<'a>(
    cx: &'a ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'a, Result<Value, ApiError>> {
    Box::pin(async move {
        let (id, patch) = validation::validate_update_args(&args)?;
        let user = cx.store.update(id, patch).await?;
        Ok(json!({"success": true, "user": user}))
    })
}

fn delete_user<'a>(
    cx: &'a ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'a, Result<Value, ApiError>> {
    Box::pin(async move {
        let id = validation::validate_user_id(&args)?;
        cx.store.delete(id).await?;
        Ok(json!({"success": true, "message": "User deleted successfully"}))
    })
}

fn query_with_llm<'a>(
    cx: &'a ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'a, Result<Value, ApiError>> {
    Box::pin(async move {
        let query = validation::validate_query_args(&args)?;
        let answer = answer_question(cx.store.as_ref(), cx.llm.as_ref(), &query)
            .await
            .map_err(|err| match err {
                AnswerError::Store(store_err) => ApiError::from(store_err),
                llm_err @ AnswerError::Llm(_) => ApiError::Internal(llm_err.to_string()),
            })?;
        Ok(json!({
            "success": true,
            "llm_response": answer,
            "mode": "langchain"
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;
    use crate::tool_registry::ToolRegistry;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct ScriptedLlm(&'static str);

    #[async_trait]
    impl crate::llm::LlmBackend for ScriptedLlm {
        async fn ask(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn context_with_llm(reply: &'static str) -> ToolContext {
        ToolContext {
            store: Arc::new(MemoryUserStore::new()),
            llm: Arc::new(ScriptedLlm(reply)),
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_then_fetch_via_tools() {
        let registry = ToolRegistry::with_builtin_tools();
        let cx = context_with_llm("");

        let inserted = registry
            .call(
                &cx,
                "insert_user",
                args(json!({"username": "alice", "email": "alice@example.com"})),
            )
            .await
            .unwrap();
        assert_eq!(inserted["success"], true);
        let id = inserted["user"]["id"].as_i64().unwrap();

        let fetched = registry
            .call(&cx, "get_user_by_id", args(json!({"user_id": id})))
            .await
            .unwrap();
        assert_eq!(fetched["user"]["username"], "alice");
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let registry = ToolRegistry::with_builtin_tools();
        let cx = context_with_llm("");
        let alice = json!({"username": "alice", "email": "alice@example.com"});

        registry
            .call(&cx, "insert_user", args(alice.clone()))
            .await
            .unwrap();
        let err = registry
            .call(&cx, "insert_user", args(alice))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn update_without_fields_is_a_bad_request() {
        let registry = ToolRegistry::with_builtin_tools();
        let cx = context_with_llm("");
        registry
            .call(
                &cx,
                "insert_user",
                args(json!({"username": "bob", "email": "bob@example.com"})),
            )
            .await
            .unwrap();

        let err = registry
            .call(&cx, "update_user", args(json!({"user_id": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let registry = ToolRegistry::with_builtin_tools();
        let cx = context_with_llm("");

        for tool in ["get_user_by_id", "delete_user"] {
            let err = registry
                .call(&cx, tool, args(json!({"user_id": 42})))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::NotFound(_)), "{tool}");
        }
    }

    #[tokio::test]
    async fn delete_reports_success_message() {
        let registry = ToolRegistry::with_builtin_tools();
        let cx = context_with_llm("");
        registry
            .call(
                &cx,
                "insert_user",
                args(json!({"username": "gone", "email": "gone@example.com"})),
            )
            .await
            .unwrap();

        let deleted = registry
            .call(&cx, "delete_user", args(json!({"user_id": 1})))
            .await
            .unwrap();
        assert_eq!(deleted["message"], "User deleted successfully");
    }

    #[tokio::test]
    async fn llm_tool_wraps_the_answer() {
        let registry = ToolRegistry::with_builtin_tools();
        let cx = context_with_llm(r#"{"total": 0}"#);

        let result = registry
            .call(&cx, "query_with_llm", args(json!({"query": "count users"})))
            .await
            .unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["mode"], "langchain");
        assert_eq!(result["llm_response"]["total"], 0);
    }
}
