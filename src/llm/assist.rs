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

//! Natural-language questions over the user table.
//!
//! The current user listing is rendered into a fixed-format summary and
//! embedded in an instruction prompt. The model's reply is returned as
//! parsed JSON when it parses, and as raw text when it does not; the
//! model is not guaranteed to follow formatting instructions, so the
//! dual-shape contract is deliberate.

use serde_json::Value;

use super::LlmBackend;
use crate::store::{StoreError, UserStore, UserSummary};

/// What a question produced: structured data if the reply parsed as
/// JSON, otherwise the reply verbatim.
pub async fn answer_question(
    store: &dyn UserStore,
    llm: &dyn LlmBackend,
    query: &str,
) -> Result<Value, AnswerError> {
    let users = store.list_summaries().await?;
    let summary = render_users_summary(&users);
    let prompt = build_prompt(query, &summary);

    let reply = llm.ask(&prompt).await.map_err(AnswerError::Llm)?;
    Ok(parse_reply(&reply))
}

#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Error querying with LLM: {0}")]
    Llm(anyhow::Error),
}

/// Fixed-format textual rendering of the reduced user projection.
pub fn render_users_summary(users: &[UserSummary]) -> String {
    let mut summary = format!("Total users: {}\n", users.len());
    for user in users {
        summary.push_str(&format!(
            "ID: {}, Username: {}, Email: {}, Name: {} {}\n",
            user.id,
            user.username,
            user.email,
            user.first_name.as_deref().unwrap_or(""),
            user.last_name.as_deref().unwrap_or(""),
        ));
    }
    summary
}

/// Instruction prompt wrapping the user's question and the current data.
pub fn build_prompt(query: &str, users_summary: &str) -> String {
    format!(
        "You are a database assistant. The user asked: \"{query}\"\n\
         \n\
         Database content:\n\
         {users_summary}\n\
         Instructions:\n\
         - Provide clear, well-formatted responses\n\
         - Use proper spacing and indentation for readability\n\
         - Do NOT use markdown code blocks (```)\n\
         - Do NOT include explanations or descriptions after the data\n\
         - If returning JSON, format it cleanly with proper line breaks\n\
         - Be concise and direct"
    )
}

fn parse_reply(reply: &str) -> Value {
    match serde_json::from_str::<Value>(reply.trim()) {
        Ok(parsed) => parsed,
        Err(_) => Value::String(reply.to_string()),
    }
}
