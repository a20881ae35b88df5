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

//! In-memory user store with the same semantics as the PostgreSQL one,
//! including uniqueness and atomicity. Backs isolated tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{NewUser, StoreError, User, UserPatch, UserStore, UserSummary};

#[derive(Default)]
struct Inner {
    next_id: i32,
    rows: BTreeMap<i32, User>,
}

impl Inner {
    /// Uniqueness scan mirroring the database constraints. `exclude`
    /// skips the row being updated.
    fn conflict(&self, username: &str, email: &str, exclude: Option<i32>) -> Option<String> {
        for user in self.rows.values() {
            if Some(user.id) == exclude {
                continue;
            }
            if user.username == username {
                return Some(format!("duplicate username \"{username}\""));
            }
            if user.email == email {
                return Some(format!("duplicate email \"{email}\""));
            }
        }
        None
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write();
        if let Some(detail) = inner.conflict(&new.username, &new.email, None) {
            return Err(StoreError::Conflict(detail));
        }
        inner.next_id += 1;
        let now = Utc::now();
        let user = User {
            id: inner.next_id,
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.read().rows.values().cloned().collect())
    }

    async fn get(&self, id: i32) -> Result<User, StoreError> {
        self.inner
            .read()
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, id: i32, patch: UserPatch) -> Result<User, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }
        let mut inner = self.inner.write();
        let current = inner.rows.get(&id).cloned().ok_or(StoreError::NotFound)?;

        let mut updated = current;
        if let Some(username) = patch.username {
            updated.username = username;
        }
        if let Some(email) = patch.email {
            updated.email = email;
        }
        if let Some(first_name) = patch.first_name {
            updated.first_name = Some(first_name);
        }
        if let Some(last_name) = patch.last_name {
            updated.last_name = Some(last_name);
        }

        // Check against the would-be row before committing anything.
        if let Some(detail) = inner.conflict(&updated.username, &updated.email, Some(id)) {
            return Err(StoreError::Conflict(detail));
        }
        updated.updated_at = Utc::now();
        inner.rows.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: i32) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list_summaries(&self) -> Result<Vec<UserSummary>, StoreError> {
        Ok(self
            .inner
            .read()
            .rows
            .values()
            .map(|user| UserSummary {
                id: user.id,
                username: user.username.clone(),
                email: user.email.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
