// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User management calls, authenticated through the gateway.

use crate::context::SessionContext;
use crate::error::SessionError;
use crate::gateway::Request;
use crate::model::{Envelope, UpdateUser, UserProfile};

impl SessionContext {
    pub async fn list_users(&self) -> Result<Vec<UserProfile>, SessionError> {
        let users: Envelope<Vec<UserProfile>> =
            self.gateway().request_json(&Request::get("/users")).await?;
        Ok(users.data)
    }

    /// Apply a partial update. Updating yourself refreshes the cached profile.
    pub async fn update_user(&self, id: i64, update: &UpdateUser) -> Result<UserProfile, SessionError> {
        let body = serde_json::to_value(update)
            .map_err(|e| SessionError::Decode(format!("Invalid user update: {e}")))?;
        let updated: Envelope<UserProfile> =
            self.gateway().request_json(&Request::patch(format!("/users/{id}"), body)).await?;

        let session = self.gateway().session();
        if session.snapshot().user.is_some_and(|u| u.id == id) {
            session.set_user(session.epoch(), &updated.data);
        }
        tracing::info!(user_id = id, "user updated");
        Ok(updated.data)
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), SessionError> {
        self.gateway().request(&Request::delete(format!("/users/{id}"))).await?;
        tracing::info!(user_id = id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "users_tests.rs"]
mod tests;
