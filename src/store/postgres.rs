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

//! PostgreSQL user store.
//!
//! Each operation connects, runs its statement(s), and drops the
//! connection. There is no pool and no transaction spanning calls; a
//! single INSERT/UPDATE is already atomic with respect to the unique
//! constraints, which is all the conflict handling here relies on.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{ConnectOptions, PgConnection, Row};

use super::{NewUser, StoreError, User, UserPatch, UserStore, UserSummary};
use crate::config::DatabaseConfig;

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, created_at, updated_at";

/// The update whitelist. Only placeholders derived from this table are
/// ever concatenated into a statement; values are always bound.
const UPDATABLE_FIELDS: &[&str] = &["username", "email", "first_name", "last_name"];

pub struct PgUserStore {
    options: PgConnectOptions,
}

impl PgUserStore {
    pub fn new(config: &DatabaseConfig) -> Self {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user);
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        Self { options }
    }

    async fn connect(&self) -> Result<PgConnection, StoreError> {
        Ok(self.options.connect().await?)
    }

    /// Create the users table if it is missing. Called once at startup.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id SERIAL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT,
                last_name TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&mut conn)
        .await?;
        Ok(())
    }
}

fn row_to_user(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_summary(row: &PgRow) -> Result<UserSummary, sqlx::Error> {
    Ok(UserSummary {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
    })
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let mut conn = self.connect().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO users (username, email, first_name, last_name) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .fetch_one(&mut conn)
        .await?;
        Ok(row_to_user(&row)?)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&mut conn)
        .await?;
        rows.iter()
            .map(|row| row_to_user(row).map_err(StoreError::from))
            .collect()
    }

    async fn get(&self, id: i32) -> Result<User, StoreError> {
        let mut conn = self.connect().await?;
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut conn)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row_to_user(&row)?)
    }

    async fn update(&self, id: i32, patch: UserPatch) -> Result<User, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }

        let mut conn = self.connect().await?;

        let exists = sqlx::query("SELECT 1 FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut conn)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }

        let values: Vec<(&str, &Option<String>)> = UPDATABLE_FIELDS
            .iter()
            .zip([
                &patch.username,
                &patch.email,
                &patch.first_name,
                &patch.last_name,
            ])
            .filter(|(_, value)| value.is_some())
            .map(|(field, value)| (*field, value))
            .collect();

        let assignments: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("{} = ${}", field, i + 1))
            .collect();

        let statement = format!(
            "UPDATE users SET {}, updated_at = NOW() WHERE id = ${} RETURNING {USER_COLUMNS}",
            assignments.join(", "),
            values.len() + 1
        );

        let mut query = sqlx::query(&statement);
        for (_, value) in &values {
            query = query.bind(value.as_deref());
        }
        let row = query.bind(id).fetch_one(&mut conn).await?;
        Ok(row_to_user(&row)?)
    }

    async fn delete(&self, id: i32) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;

        let exists = sqlx::query("SELECT 1 FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut conn)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_summaries(&self) -> Result<Vec<UserSummary>, StoreError> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            "SELECT id, username, email, first_name, last_name FROM users ORDER BY id",
        )
        .fetch_all(&mut conn)
        .await?;
        rows.iter()
            .map(|row| row_to_summary(row).map_err(StoreError::from))
            .collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        sqlx::query("SELECT 1").execute(&mut conn).await?;
        Ok(())
    }
}
