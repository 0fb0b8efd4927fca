// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session aggregate and its observable.

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::model::{TokenPair, UserProfile};
use crate::store::{SessionStore, StoredSession};

/// Lifecycle status of the current principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
    /// Tokens are held but no profile could be loaded for them.
    Error,
}

/// Snapshot of the session, as published to observers.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    #[serde(skip)]
    pub access_token: Option<String>,
    #[serde(skip)]
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
    pub status: SessionStatus,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    /// Re-derive `Authenticated` from the held token and profile.
    fn settle(&mut self) {
        let complete = self.access_token.is_some() && self.user.is_some();
        if complete {
            self.status = SessionStatus::Authenticated;
        } else if self.status == SessionStatus::Authenticated {
            self.status = SessionStatus::Authenticating;
        }
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("user", &self.user)
            .field("status", &self.status)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Shared session: current state, its durable mirror, and an epoch.
///
/// The epoch changes whenever the session is started, restored, or cleared.
/// Writers that suspended across a network call pass the epoch they started
/// under, and their write is dropped if it no longer matches.
pub struct Session {
    state: watch::Sender<SessionState>,
    epoch: Mutex<u64>,
    store: SessionStore,
}

impl Session {
    pub fn new(store: SessionStore) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { state, epoch: Mutex::new(0), store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.borrow().refresh_token.clone()
    }

    /// Start a fresh authentication attempt. Drops any previous principal.
    pub fn begin(&self) -> u64 {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        self.state.send_replace(SessionState {
            status: SessionStatus::Authenticating,
            ..SessionState::default()
        });
        *epoch
    }

    /// Adopt a previously persisted session without touching the network.
    pub fn restore(&self, stored: StoredSession) -> u64 {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        let mut state = SessionState {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            user: stored.user,
            status: SessionStatus::Authenticating,
            last_error: None,
        };
        state.settle();
        self.state.send_replace(state);
        *epoch
    }

    /// Install a new token pair if the session is still at `epoch`.
    pub fn install_tokens(&self, epoch: u64, pair: &TokenPair) -> bool {
        let current = self.epoch.lock();
        if *current != epoch {
            return false;
        }
        self.state.send_modify(|s| {
            s.access_token = Some(pair.access_token.clone());
            s.refresh_token = Some(pair.refresh_token.clone());
            s.settle();
        });
        self.store.save_tokens(pair);
        true
    }

    /// Replace the profile if the session is still at `epoch` and holds a token.
    pub fn set_user(&self, epoch: u64, user: &UserProfile) -> bool {
        let current = self.epoch.lock();
        if *current != epoch || self.state.borrow().access_token.is_none() {
            return false;
        }
        self.state.send_modify(|s| {
            s.user = Some(user.clone());
            s.last_error = None;
            s.settle();
        });
        self.store.save_user(user);
        true
    }

    /// Record a failure message without changing status.
    pub fn record_error(&self, message: &str) {
        self.state.send_modify(|s| s.last_error = Some(message.to_owned()));
    }

    /// Mark a session at `epoch` that holds tokens but no usable profile.
    pub fn mark_unverified(&self, epoch: u64) {
        let current = self.epoch.lock();
        if *current != epoch {
            return;
        }
        self.state.send_if_modified(|s| {
            if s.user.is_none() && s.access_token.is_some() {
                s.status = SessionStatus::Error;
                return true;
            }
            false
        });
    }

    /// Drop everything, in memory and in the store.
    pub fn clear(&self, last_error: Option<String>) {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        self.state.send_replace(SessionState { last_error, ..SessionState::default() });
        self.store.clear();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
