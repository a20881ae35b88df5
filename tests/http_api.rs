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

//! End-to-end tests driving the whole HTTP surface in-process.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use userhub_server::api::AppState;
use userhub_server::auth::{JwtAuth, StaticCredentials};
use userhub_server::build_router;
use userhub_server::config::RateLimitSettings;
use userhub_server::llm::LlmBackend;
use userhub_server::store::MemoryUserStore;
use userhub_server::tool_registry::ToolRegistry;

const SECRET: &str = "test-secret";

struct ScriptedLlm(&'static str);

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn ask(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

struct DownLlm;

#[async_trait]
impl LlmBackend for DownLlm {
    async fn ask(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("connection refused")
    }

    fn model(&self) -> &str {
        "down"
    }
}

fn test_state(llm: Arc<dyn LlmBackend>) -> AppState {
    AppState {
        store: Arc::new(MemoryUserStore::new()),
        llm,
        jwt: Arc::new(JwtAuth::new(SECRET, 24)),
        credentials: Arc::new(StaticCredentials::new(
            "admin".to_string(),
            "password".to_string(),
            1,
        )),
        tools: Arc::new(ToolRegistry::with_builtin_tools()),
    }
}

fn unlimited() -> RateLimitSettings {
    RateLimitSettings {
        enabled: false,
        ..RateLimitSettings::default()
    }
}

fn app() -> Router {
    build_router(test_state(Arc::new(ScriptedLlm("ok"))), &unlimited())
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            None,
            json!({"username": "admin", "password": "password"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["token"].as_str().unwrap().to_string()
}

async fn call_tool(app: &Router, token: &str, name: &str, arguments: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/mcp/call_tool",
            Some(token),
            json!({"name": name, "arguments": arguments}),
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn login_issues_token_and_rejects_bad_credentials() {
    let app = app();

    let token = login(&app).await;
    assert!(!token.is_empty());

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            None,
            json!({"username": "admin", "password": "wrong-one"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn login_validates_its_payload() {
    let app = app();

    let response = app
        .clone()
        .oneshot(post_json("/auth/login", None, json!({"username": "admin"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["details"]["password"].is_array());
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = app();

    // Missing header
    let response = app.clone().oneshot(get("/mcp/tools", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Authorization header required");

    // Tampered token
    let mut token = login(&app).await;
    token.push('x');
    let response = app
        .clone()
        .oneshot(get("/mcp/tools", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid token");

    // Expired token, signed with the right secret
    let expired = JwtAuth::new(SECRET, -1).generate_token(1, "admin").unwrap();
    let response = app
        .clone()
        .oneshot(get("/mcp/tools", Some(&expired)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Token has expired");
}

#[tokio::test]
async fn verify_reflects_the_claims() {
    let app = app();
    let token = login(&app).await;

    let response = app
        .clone()
        .oneshot(get("/auth/verify", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["user"]["username"], "admin");
    assert_eq!(body["user"]["user_id"], 1);
}

#[tokio::test]
async fn tool_listing_names_all_six_tools() {
    let app = app();
    let token = login(&app).await;

    let response = app
        .clone()
        .oneshot(get("/mcp/tools", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["langchain_mode"], true);

    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "insert_user",
            "get_users",
            "get_user_by_id",
            "update_user",
            "delete_user",
            "query_with_llm",
        ]
    );
    for tool in body["tools"].as_array().unwrap() {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}

#[tokio::test]
async fn crud_round_trip() {
    let app = app();
    let token = login(&app).await;

    let (status, body) = call_tool(&app, &token, "get_users", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"users": []}));

    let (status, body) = call_tool(
        &app,
        &token,
        "insert_user",
        json!({
            "username": "alice",
            "email": "alice@example.com",
            "first_name": "Alice",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let id = body["user"]["id"].as_i64().unwrap();

    let (status, body) = call_tool(&app, &token, "get_user_by_id", json!({"user_id": id})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["first_name"], "Alice");
    assert_eq!(body["user"]["last_name"], Value::Null);

    let (status, body) = call_tool(
        &app,
        &token,
        "update_user",
        json!({"user_id": id, "last_name": "Liddell"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["first_name"], "Alice");
    assert_eq!(body["user"]["last_name"], "Liddell");

    let (status, body) = call_tool(&app, &token, "delete_user", json!({"user_id": id})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deleted successfully");

    let (status, _) = call_tool(&app, &token, "get_user_by_id", json!({"user_id": id})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn hostile_field_values_survive_storage() {
    let app = app();
    let token = login(&app).await;

    // Values that would break naive string-built SQL must round-trip
    // unchanged through bound parameters.
    let username = "robert'); DROP TABLE users;--";
    let (status, body) = call_tool(
        &app,
        &token,
        "insert_user",
        json!({"username": username, "email": "bobby@tables.example", "last_name": "O'Brien"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["user"]["id"].as_i64().unwrap();

    let (_, body) = call_tool(&app, &token, "get_user_by_id", json!({"user_id": id})).await;
    assert_eq!(body["user"]["username"], username);
    assert_eq!(body["user"]["last_name"], "O'Brien");
}

#[tokio::test]
async fn duplicate_users_conflict() {
    let app = app();
    let token = login(&app).await;
    let alice = json!({"username": "alice", "email": "alice@example.com"});

    let (status, _) = call_tool(&app, &token, "insert_user", alice.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call_tool(&app, &token, "insert_user", alice).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Username or email already exists"));
}

#[tokio::test]
async fn update_edge_cases() {
    let app = app();
    let token = login(&app).await;

    let (status, body) = call_tool(
        &app,
        &token,
        "update_user",
        json!({"user_id": 99, "username": "ghost"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    call_tool(
        &app,
        &token,
        "insert_user",
        json!({"username": "bob", "email": "bob@example.com"}),
    )
    .await;

    let (status, body) = call_tool(&app, &token, "update_user", json!({"user_id": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No fields to update");
}

#[tokio::test]
async fn tool_argument_validation_reports_fields() {
    let app = app();
    let token = login(&app).await;

    let (status, body) = call_tool(&app, &token, "insert_user", json!({"username": "solo"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["email"].is_array());

    let (status, body) = call_tool(&app, &token, "get_user_by_id", json!({"user_id": "7"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["user_id"].is_array());
}

#[tokio::test]
async fn unknown_tool_is_named_in_the_error() {
    let app = app();
    let token = login(&app).await;

    let (status, body) = call_tool(&app, &token, "drop_everything", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown tool: drop_everything");
}

#[tokio::test]
async fn malformed_bodies_are_rejected() {
    let app = app();
    let token = login(&app).await;

    // Broken JSON
    let request = Request::builder()
        .method("POST")
        .uri("/mcp/call_tool")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid JSON payload");

    // Wrong content type
    let request = Request::builder()
        .method("POST")
        .uri("/mcp/call_tool")
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Content-Type must be application/json");
}

#[tokio::test]
async fn llm_tool_returns_structured_or_raw_answers() {
    // The model sometimes returns clean JSON, sometimes prose; both
    // come back to the caller under llm_response.
    let structured = build_router(
        test_state(Arc::new(ScriptedLlm(r#"{"total_users": 2}"#))),
        &unlimited(),
    );
    let token = login(&structured).await;
    let (status, body) =
        call_tool(&structured, &token, "query_with_llm", json!({"query": "how many?"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["mode"], "langchain");
    assert_eq!(body["llm_response"]["total_users"], 2);

    let prose = build_router(
        test_state(Arc::new(ScriptedLlm("There are two users."))),
        &unlimited(),
    );
    let token = login(&prose).await;
    let (status, body) =
        call_tool(&prose, &token, "query_with_llm", json!({"query": "how many?"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["llm_response"], "There are two users.");
}

#[tokio::test]
async fn health_reports_llm_availability() {
    let app = app();
    let response = app.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["ollama"], "connected");
    assert_eq!(body["langchain_mode"], true);

    let degraded = build_router(test_state(Arc::new(DownLlm)), &unlimited());
    let response = degraded.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ollama"], "unavailable");
}

#[tokio::test]
async fn suspicious_query_parameters_are_screened() {
    let app = app();
    let response = app
        .clone()
        .oneshot(get("/health?filter=1+UNION+SELECT+*--", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid query parameters detected");
}

#[tokio::test]
async fn quota_exhaustion_returns_429_with_retry_after() {
    let settings = RateLimitSettings {
        enabled: true,
        health_per_minute: 3,
        ..RateLimitSettings::default()
    };
    let app = build_router(test_state(Arc::new(ScriptedLlm("ok"))), &settings);

    for _ in 0..3 {
        let response = app.clone().oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("Retry-After"));
    let body = body_json(response).await;
    assert_eq!(body["error"], "Too many requests");
}

#[tokio::test]
async fn rate_limits_are_per_route_class() {
    let settings = RateLimitSettings {
        enabled: true,
        health_per_minute: 1,
        ..RateLimitSettings::default()
    };
    let app = build_router(test_state(Arc::new(ScriptedLlm("ok"))), &settings);

    let response = app.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // The login class has its own counter and is unaffected.
    let token = login(&app).await;
    assert!(!token.is_empty());
}
