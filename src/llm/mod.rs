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

//! Language-model bridge.
//!
//! The backend is an opaque prompt-in/text-out service. Failures
//! propagate to the caller; there are no retries and no timeout beyond
//! what the HTTP client and the backend themselves enforce.

mod assist;

pub use assist::{answer_question, build_prompt, render_users_summary, AnswerError};

use async_trait::async_trait;
use serde_json::json;

use crate::config::LlmConfig;

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send a prompt and return the raw text reply.
    async fn ask(&self, prompt: &str) -> anyhow::Result<String>;

    fn model(&self) -> &str;
}

/// Ollama over its native generate endpoint.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn ask(&self, prompt: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama returned {}", response.status());
        }

        let json: serde_json::Value = response.json().await?;
        Ok(json["response"].as_str().unwrap_or_default().to_string())
    }

    fn model(&self) -> &str {
        &self.model
    }
}
