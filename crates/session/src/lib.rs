// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authsession: client-side session and token lifecycle for a JWT backend.
//!
//! A [`SessionContext`] owns the signed-in principal. Requests go through the
//! [`Gateway`](gateway::Gateway), which attaches the bearer token and performs
//! a single-flight refresh on 401. The [`RefreshScheduler`] refreshes ahead of
//! expiry, and the [`SessionStore`] mirrors the session to durable storage.

pub mod account;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod model;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod transport;
pub mod users;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

pub use crate::config::SessionConfig;
pub use crate::context::SessionContext;
pub use crate::error::SessionError;
pub use crate::model::{TokenPair, UpdateUser, UserProfile};
pub use crate::scheduler::{RefreshPolicy, RefreshScheduler};
pub use crate::session::{SessionState, SessionStatus};
pub use crate::store::{FileStore, SessionStore};

/// Context over HTTP with the session persisted under the configured state dir.
pub fn open(config: &SessionConfig) -> anyhow::Result<SessionContext> {
    let dir = config.state_dir();
    let store = FileStore::in_dir(&dir)?;
    tracing::debug!(path = %store.path().display(), "using session file");
    SessionContext::connect(config, SessionStore::new(Arc::new(store)))
}
