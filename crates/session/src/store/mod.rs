// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable mirror of the session: tokens, cached profile, timer hint.
//!
//! The store is a best-effort cache. Writes that fail are logged and
//! dropped; the in-memory session stays the source of truth.

pub mod file;
pub mod memory;

use std::sync::Arc;

use crate::model::{TokenPair, UserProfile};

pub use file::FileStore;
pub use memory::MemoryStore;

pub const ACCESS_TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";
pub const TIMER_HINT_KEY: &str = "refreshTimerId";

const ALL_KEYS: [&str; 4] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY, TIMER_HINT_KEY];

/// String key-value medium backing the session store.
///
/// Object-safe for use as `Arc<dyn KeyValueStore>`.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    fn remove(&self, key: &str) -> anyhow::Result<()>;

    /// Remove several keys. Backends override this to commit in one write.
    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// Whatever subset of the session was found in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
}

impl StoredSession {
    pub fn has_tokens(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }
}

/// Typed view over a [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    /// Write tokens and profile. Each key is written independently.
    pub fn save(&self, pair: &TokenPair, user: Option<&UserProfile>) {
        self.save_tokens(pair);
        if let Some(user) = user {
            self.save_user(user);
        }
    }

    pub fn save_tokens(&self, pair: &TokenPair) {
        self.put(ACCESS_TOKEN_KEY, &pair.access_token);
        self.put(REFRESH_TOKEN_KEY, &pair.refresh_token);
    }

    pub fn save_user(&self, user: &UserProfile) {
        match serde_json::to_string(user) {
            Ok(json) => self.put(USER_KEY, &json),
            Err(e) => tracing::warn!(err = %e, "failed to serialize cached profile"),
        }
    }

    /// Read whatever is present. A malformed cached profile reads as absent.
    pub fn load(&self) -> StoredSession {
        let user = self.fetch(USER_KEY).and_then(|raw| {
            match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(err = %e, "ignoring malformed cached profile");
                    None
                }
            }
        });
        StoredSession {
            access_token: self.fetch(ACCESS_TOKEN_KEY),
            refresh_token: self.fetch(REFRESH_TOKEN_KEY),
            user,
        }
    }

    /// Remove tokens, profile, and timer hint in one step.
    pub fn clear(&self) {
        if let Err(e) = self.kv.remove_many(&ALL_KEYS) {
            tracing::warn!(err = %e, "failed to clear session store");
        }
    }

    pub fn set_timer_hint(&self, id: &str) {
        self.put(TIMER_HINT_KEY, id);
    }

    pub fn clear_timer_hint(&self) {
        if let Err(e) = self.kv.remove(TIMER_HINT_KEY) {
            tracing::warn!(err = %e, "failed to clear refresh timer hint");
        }
    }

    /// Read and remove a timer hint left behind by an earlier process.
    pub fn take_timer_hint(&self) -> Option<String> {
        let hint = self.fetch(TIMER_HINT_KEY)?;
        self.clear_timer_hint();
        Some(hint)
    }

    fn put(&self, key: &str, value: &str) {
        if let Err(e) = self.kv.set(key, value) {
            tracing::warn!(key, err = %e, "session store write failed");
        }
    }

    fn fetch(&self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, err = %e, "session store read failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
