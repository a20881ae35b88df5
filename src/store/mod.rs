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

//! User store: trait seam plus the PostgreSQL and in-memory backends.
//!
//! Every statement uses bound parameters exclusively; field content can
//! never change statement structure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod memory;
mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

/// Store-level error taxonomy. The HTTP layer maps these onto status codes.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User not found")]
    NotFound,

    #[error("Username or email already exists: {0}")]
    Conflict(String),

    #[error("No fields to update")]
    EmptyUpdate,

    #[error("Database error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// A full user row as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for an insert. Username and email are mandatory; the validator
/// enforces non-emptiness before a store ever sees this.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Partial update: only present fields are written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
    }
}

/// Reduced projection handed to the LLM bridge. No response wrapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// The six store operations plus a health round-trip.
///
/// Implementations open and release whatever connection they need within
/// each call; nothing is held across calls and no transaction spans them.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a row and return it in full. Unique-constraint violations
    /// surface as [`StoreError::Conflict`] with no partial write.
    async fn insert(&self, new: NewUser) -> Result<User, StoreError>;

    /// All rows, ordered by id ascending.
    async fn list(&self) -> Result<Vec<User>, StoreError>;

    async fn get(&self, id: i32) -> Result<User, StoreError>;

    /// Existence check, then update the given fields only.
    async fn update(&self, id: i32, patch: UserPatch) -> Result<User, StoreError>;

    /// Existence check, then delete.
    async fn delete(&self, id: i32) -> Result<(), StoreError>;

    /// The reduced projection, ordered by id ascending.
    async fn list_summaries(&self) -> Result<Vec<UserSummary>, StoreError>;

    /// Trivial round-trip for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}
