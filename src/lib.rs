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

pub mod api;
pub mod auth;
pub mod config;
pub mod llm;
pub mod sanitization;
pub mod store;
pub mod tool_registry;
pub mod validation;

use anyhow::Result;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{call_tool, health_check, list_tools, login, verify_token, AppState};
use auth::rate_limit::{enforce, RateLimitConfig, RateLimiter};
use auth::{require_auth, JwtAuth, StaticCredentials};
use config::{RateLimitSettings, ServerConfig};
use llm::OllamaBackend;
use store::PgUserStore;
use tool_registry::ToolRegistry;

fn with_rate_limit(
    router: Router<AppState>,
    quota_per_minute: u32,
    enabled: bool,
) -> Router<AppState> {
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::per_minute(
        quota_per_minute,
        enabled,
    )));
    router.route_layer(axum_middleware::from_fn(
        move |request: axum::extract::Request, next: axum_middleware::Next| {
            let limiter = limiter.clone();
            async move { enforce(limiter, request, next).await }
        },
    ))
}

/// Assemble the application router. Split out of `run_server` so tests
/// can drive the whole HTTP surface in-process.
pub fn build_router(state: AppState, rate: &RateLimitSettings) -> Router {
    // Each route class carries its own limiter so a client burning its
    // tool quota can still hit /health.
    let health_routes = with_rate_limit(
        Router::new().route("/health", get(health_check)),
        rate.health_per_minute,
        rate.enabled,
    );

    let login_routes = with_rate_limit(
        Router::new().route("/auth/login", post(login)),
        rate.default_per_minute,
        rate.enabled,
    );

    let tools_routes = with_rate_limit(
        Router::new().route("/mcp/tools", get(list_tools)),
        rate.tools_per_minute,
        rate.enabled,
    );

    let call_tool_routes = with_rate_limit(
        Router::new().route("/mcp/call_tool", post(call_tool)),
        rate.call_tool_per_minute,
        rate.enabled,
    );

    let verify_routes = with_rate_limit(
        Router::new().route("/auth/verify", get(verify_token)),
        rate.default_per_minute,
        rate.enabled,
    );

    // Auth is layered after the rate limiters so it runs first: an
    // unauthenticated request is rejected without consuming quota.
    let authed_routes = Router::new()
        .merge(tools_routes)
        .merge(call_tool_routes)
        .merge(verify_routes)
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(health_routes)
        .merge(login_routes)
        .merge(authed_routes)
        .layer(axum_middleware::from_fn(sanitization::screen_query_params))
        .with_state(state)
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "userhub_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Userhub Server");

    config.validate()?;

    // Connect to Postgres and make sure the schema exists
    let store = PgUserStore::new(&config.database);
    store.migrate().await?;
    tracing::info!(
        host = %config.database.host,
        database = %config.database.database,
        "Database ready"
    );

    let llm = OllamaBackend::new(&config.llm);
    tracing::info!(model = %config.llm.model, base_url = %config.llm.base_url, "LLM backend configured");

    let state = AppState {
        store: Arc::new(store),
        llm: Arc::new(llm),
        jwt: Arc::new(JwtAuth::new(
            &config.auth.jwt_secret,
            config.auth.token_ttl_hours,
        )),
        credentials: Arc::new(StaticCredentials::new(
            config.auth.login_username.clone(),
            config.auth.login_password.clone(),
            1,
        )),
        tools: Arc::new(ToolRegistry::with_builtin_tools()),
    };

    let app = build_router(state, &config.auth.rate_limit)
        .layer(if config.server.enable_cors {
            let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
            if config.server.cors_origins.is_empty() {
                tracing::warn!(
                    "CORS: Allowing all origins (development mode). Set cors_origins in production!"
                );
            } else {
                tracing::info!("CORS: Allowing origins: {:?}", config.server.cors_origins);
            }
            cors.allow_origin(Any)
        } else {
            CorsLayer::new()
        })
        .layer(TraceLayer::new_for_http());

    let addr = config.socket_addr()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
