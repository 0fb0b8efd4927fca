// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session context: login, signup, logout, profile refresh, and startup
//! restoration on top of the gateway.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::gateway::{Gateway, Request};
use crate::model::{Envelope, TokenGrant, TokenPair, UserProfile};
use crate::session::{Session, SessionState};
use crate::store::SessionStore;
use crate::transport::{ReqwestTransport, Transport};

/// Owner of the session state machine.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionContext {
    gateway: Arc<Gateway>,
}

impl SessionContext {
    pub fn new(config: &SessionConfig, transport: Arc<dyn Transport>, store: SessionStore) -> Self {
        let session = Arc::new(Session::new(store));
        let gateway = Gateway::new(config.api_url.clone(), transport, session, config.refresh_policy());
        Self { gateway }
    }

    /// Context talking to the configured backend over HTTP.
    pub fn connect(config: &SessionConfig, store: SessionStore) -> anyhow::Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
        Ok(Self::new(config, transport, store))
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn snapshot(&self) -> SessionState {
        self.session().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session().subscribe()
    }

    fn session(&self) -> &Arc<Session> {
        self.gateway.session()
    }

    /// Hydrate from the store.
    ///
    /// With tokens present the session is usable immediately (authenticated
    /// when a cached profile exists), and a background task re-fetches the
    /// profile. The returned handle resolves when that check is done.
    pub fn restore(&self) -> Option<JoinHandle<()>> {
        let store = self.session().store();
        if let Some(hint) = store.take_timer_hint() {
            tracing::debug!(hint = %hint, "dropping refresh timer hint from previous process");
        }

        let stored = store.load();
        if !stored.has_tokens() {
            tracing::debug!("no stored session");
            return None;
        }
        let cached_profile = stored.user.is_some();
        let epoch = self.session().restore(stored);
        tracing::info!(cached_profile, "restored session from store");

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, skipping restored session check");
            return None;
        };
        let ctx = self.clone();
        Some(runtime.spawn(async move {
            if ctx.fetch_current_user().await.is_none() {
                ctx.session().mark_unverified(epoch);
            }
        }))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        self.authenticate("/auth/login", json!({ "email": email, "password": password }))
            .await
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, SessionError> {
        self.authenticate(
            "/auth/signup",
            json!({ "name": name, "email": email, "password": password }),
        )
        .await
    }

    async fn authenticate(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<UserProfile, SessionError> {
        self.gateway.scheduler().cancel();
        let epoch = self.session().begin();

        let result = async {
            let grant: Envelope<TokenGrant> =
                self.gateway.request_json(&Request::post(endpoint, body).without_auth()).await?;
            let pair = TokenPair::from(grant.data);
            if !self.session().install_tokens(epoch, &pair) {
                return Err(SessionError::AuthInvalid("Superseded by another sign-in".to_owned()));
            }
            self.gateway.scheduler().arm(pair.expires_in_secs);

            let profile: Envelope<UserProfile> =
                self.gateway.request_json(&Request::get("/auth/user")).await?;
            if !self.session().set_user(epoch, &profile.data) {
                return Err(SessionError::AuthInvalid("Superseded by another sign-in".to_owned()));
            }
            Ok(profile.data)
        }
        .await;

        match result {
            Ok(user) => {
                tracing::info!(endpoint, user_id = user.id, "signed in");
                Ok(user)
            }
            Err(e) => {
                tracing::warn!(endpoint, err = %e, kind = e.kind(), "sign-in failed");
                if self.session().epoch() == epoch {
                    self.gateway.end_session(Some(e.message().to_owned()));
                }
                Err(e)
            }
        }
    }

    /// Revoke the refresh token server-side (best effort), then clear
    /// everything locally.
    ///
    /// A refresh that rotates the pair while logout is running gets its new
    /// refresh token revoked as well.
    pub async fn logout(&self) {
        self.gateway.scheduler().cancel();
        let mut revoked: Option<String> = None;
        loop {
            self.gateway.settle_refresh().await;
            let current = self.session().refresh_token();
            if current.is_none() || current == revoked {
                break;
            }
            if let Some(ref refresh_token) = current {
                let req = Request::post("/auth/logout", json!({ "refreshToken": refresh_token }))
                    .without_refresh();
                if let Err(e) = self.gateway.request(&req).await {
                    tracing::warn!(err = %e, "logout revoke failed, clearing locally anyway");
                }
            }
            revoked = current;
        }
        self.gateway.end_session(None);
        tracing::info!("signed out");
    }

    /// Re-fetch the profile. Failures are recorded in `last_error` but never
    /// change the status on their own.
    pub async fn fetch_current_user(&self) -> Option<UserProfile> {
        let epoch = self.session().epoch();
        match self.gateway.request_json::<Envelope<UserProfile>>(&Request::get("/auth/user")).await {
            Ok(profile) => {
                self.session().set_user(epoch, &profile.data);
                Some(profile.data)
            }
            Err(e) => {
                tracing::warn!(err = %e, kind = e.kind(), "failed to fetch current user");
                self.session().record_error(e.message());
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
