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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Userhub Server Configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "0.0.0.0:8000")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all, use specific origins in production)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_name")]
    pub database: String,

    #[serde(default = "default_db_user")]
    pub user: String,

    /// Empty means "connect without a password" (trust auth, local dev).
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HMAC secret for signing tokens. The default is for development
    /// only and produces a startup warning.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Token lifetime in hours
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,

    /// Username accepted by /auth/login
    #[serde(default = "default_login_username")]
    pub login_username: String,

    /// Password accepted by /auth/login
    #[serde(default = "default_login_password")]
    pub login_password: String,

    /// Per-IP rate limiting quotas
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

/// Per-minute request quotas, one per route class. Endpoints that are
/// cheap to serve get a high ceiling; the LLM-backed tool dispatch gets
/// the lowest.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,

    #[serde(default = "default_quota_default")]
    pub default_per_minute: u32,

    #[serde(default = "default_quota_health")]
    pub health_per_minute: u32,

    #[serde(default = "default_quota_tools")]
    pub tools_per_minute: u32,

    #[serde(default = "default_quota_call_tool")]
    pub call_tool_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Ollama model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Ollama base URL (e.g., "http://localhost:11434")
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
}

fn default_http_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "userhub".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_jwt_secret() -> String {
    "dev-secret-key-change-in-production".to_string()
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_login_username() -> String {
    "admin".to_string()
}

fn default_login_password() -> String {
    "password".to_string()
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_quota_default() -> u32 {
    20
}

fn default_quota_health() -> u32 {
    200
}

fn default_quota_tools() -> u32 {
    60
}

fn default_quota_call_tool() -> u32 {
    30
}

fn default_llm_model() -> String {
    "llama3.2".to_string()
}

fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            cors_origins: vec![],
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            database: default_db_name(),
            user: default_db_user(),
            password: String::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_hours: default_token_ttl_hours(),
            login_username: default_login_username(),
            login_password: default_login_password(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            default_per_minute: default_quota_default(),
            health_per_minute: default_quota_health(),
            tools_per_minute: default_quota_tools(),
            call_tool_per_minute: default_quota_call_tool(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_llm_base_url(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: HttpServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - USERHUB_HTTP_ADDR: HTTP listen address (default: 0.0.0.0:8000)
    /// - USERHUB_JWT_SECRET: JWT signing secret
    /// - USERHUB_LOGIN_USERNAME / USERHUB_LOGIN_PASSWORD: login credentials
    /// - USERHUB_RATE_LIMIT_ENABLED: Enable rate limiting (default: true)
    /// - USERHUB_ENABLE_CORS: Enable CORS (default: true)
    /// - POSTGRES_HOST / POSTGRES_PORT / POSTGRES_DB / POSTGRES_USER /
    ///   POSTGRES_PASSWORD: database connection settings
    /// - OLLAMA_BASE_URL / OLLAMA_MODEL: LLM backend settings
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server configuration
        if let Ok(addr) = std::env::var("USERHUB_HTTP_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(cors) = std::env::var("USERHUB_ENABLE_CORS") {
            config.server.enable_cors = cors.parse().unwrap_or(true);
        }

        // Database configuration
        if let Ok(host) = std::env::var("POSTGRES_HOST") {
            config.database.host = host;
        }

        if let Ok(port) = std::env::var("POSTGRES_PORT") {
            if let Ok(val) = port.parse() {
                config.database.port = val;
            }
        }

        if let Ok(name) = std::env::var("POSTGRES_DB") {
            config.database.database = name;
        }

        if let Ok(user) = std::env::var("POSTGRES_USER") {
            config.database.user = user;
        }

        if let Ok(password) = std::env::var("POSTGRES_PASSWORD") {
            config.database.password = password;
        }

        // Auth configuration
        if let Ok(secret) = std::env::var("USERHUB_JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }

        if let Ok(username) = std::env::var("USERHUB_LOGIN_USERNAME") {
            config.auth.login_username = username;
        }

        if let Ok(password) = std::env::var("USERHUB_LOGIN_PASSWORD") {
            config.auth.login_password = password;
        }

        if let Ok(enabled) = std::env::var("USERHUB_RATE_LIMIT_ENABLED") {
            config.auth.rate_limit.enabled = enabled.parse().unwrap_or(true);
        }

        // LLM configuration
        if let Ok(base_url) = std::env::var("OLLAMA_BASE_URL") {
            config.llm.base_url = base_url;
        }

        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            config.llm.model = model;
        }

        config
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        // Override with environment variables
        config = Self::merge_with_env(config);

        Ok(config)
    }

    /// Merge config with environment variables (env takes priority)
    fn merge_with_env(mut config: Self) -> Self {
        let env_config = Self::from_env();

        // Only override if env var was explicitly set
        if std::env::var("USERHUB_HTTP_ADDR").is_ok() {
            config.server.listen_addr = env_config.server.listen_addr;
        }
        if std::env::var("POSTGRES_HOST").is_ok() {
            config.database.host = env_config.database.host;
        }
        if std::env::var("POSTGRES_PORT").is_ok() {
            config.database.port = env_config.database.port;
        }
        if std::env::var("POSTGRES_DB").is_ok() {
            config.database.database = env_config.database.database;
        }
        if std::env::var("POSTGRES_USER").is_ok() {
            config.database.user = env_config.database.user;
        }
        if std::env::var("POSTGRES_PASSWORD").is_ok() {
            config.database.password = env_config.database.password;
        }
        if std::env::var("USERHUB_JWT_SECRET").is_ok() {
            config.auth.jwt_secret = env_config.auth.jwt_secret;
        }
        if std::env::var("USERHUB_LOGIN_USERNAME").is_ok() {
            config.auth.login_username = env_config.auth.login_username;
        }
        if std::env::var("USERHUB_LOGIN_PASSWORD").is_ok() {
            config.auth.login_password = env_config.auth.login_password;
        }
        if std::env::var("USERHUB_RATE_LIMIT_ENABLED").is_ok() {
            config.auth.rate_limit.enabled = env_config.auth.rate_limit.enabled;
        }
        if std::env::var("OLLAMA_BASE_URL").is_ok() {
            config.llm.base_url = env_config.llm.base_url;
        }
        if std::env::var("OLLAMA_MODEL").is_ok() {
            config.llm.model = env_config.llm.model;
        }

        config
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.auth.jwt_secret == default_jwt_secret() {
            tracing::warn!(
                "Using the default JWT secret; set USERHUB_JWT_SECRET before exposing this service"
            );
        }

        if self.database.host.is_empty() {
            anyhow::bail!("Database host must not be empty");
        }

        Ok(())
    }
}
