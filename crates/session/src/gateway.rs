// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request gateway.
//!
//! Every backend call goes through [`Gateway::request`]. It attaches the
//! bearer token, and on a 401 it runs at most one refresh-and-retry per
//! logical call. Concurrent refreshes collapse into one exchange: the first
//! caller starts it and everyone else awaits the same shared future.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{extract_message, SessionError, NETWORK_FAILURE};
use crate::model::{Envelope, TokenGrant, TokenPair};
use crate::scheduler::{RefreshPolicy, RefreshScheduler, Refresher};
use crate::session::Session;
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenPair, SessionError>>>;

/// Logical request, retained for at most one retry after a refresh.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub endpoint: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub include_auth: bool,
    pub retry_with_refresh: bool,
}

impl Request {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
            headers: Vec::new(),
            include_auth: true,
            retry_with_refresh: true,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, endpoint).body(body)
    }

    pub fn put(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, endpoint).body(body)
    }

    pub fn patch(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, endpoint).body(body)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send without a bearer token (login, signup, public endpoints).
    pub fn without_auth(mut self) -> Self {
        self.include_auth = false;
        self
    }

    /// Surface a 401 directly instead of refreshing.
    pub fn without_refresh(mut self) -> Self {
        self.retry_with_refresh = false;
        self
    }

    fn refreshes_on_401(&self) -> bool {
        self.include_auth && self.retry_with_refresh
    }
}

/// Wraps the transport with bearer auth, refresh-and-retry, and error
/// normalization.
pub struct Gateway {
    base_url: String,
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    scheduler: RefreshScheduler,
    in_flight: Mutex<Option<SharedRefresh>>,
    this: Weak<Gateway>,
}

impl Gateway {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
        policy: RefreshPolicy,
    ) -> Arc<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Arc::new_cyclic(|this: &Weak<Gateway>| {
            let refresher: Weak<dyn Refresher> = this.clone();
            let scheduler =
                RefreshScheduler::new(policy, refresher).with_store(session.store().clone());
            Self {
                base_url,
                transport,
                session,
                scheduler,
                in_flight: Mutex::new(None),
                this: this.clone(),
            }
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Send a logical request, refreshing and retrying once on 401.
    pub async fn request(&self, req: &Request) -> Result<Value, SessionError> {
        let mut retried = false;
        loop {
            let token = if req.include_auth { self.session.access_token() } else { None };
            match self.send_once(req, token.as_deref()).await {
                Err(SessionError::AuthExpired(message)) if retried => {
                    if self.session.access_token() == token {
                        tracing::warn!(endpoint = %req.endpoint, "still unauthorized after refresh, clearing session");
                        self.end_session(Some(message.clone()));
                    }
                    return Err(SessionError::AuthInvalid(message));
                }
                Err(SessionError::AuthExpired(_)) => {
                    retried = true;
                    let current = self.session.access_token();
                    if current.is_some() && current != token {
                        tracing::debug!(endpoint = %req.endpoint, "token superseded in flight, retrying");
                        continue;
                    }
                    self.refresh().await?;
                }
                other => return other,
            }
        }
    }

    /// [`request`](Self::request), decoding the payload into `T`.
    pub async fn request_json<T: DeserializeOwned>(&self, req: &Request) -> Result<T, SessionError> {
        let value = self.request(req).await?;
        serde_json::from_value(value).map_err(|e| {
            tracing::warn!(endpoint = %req.endpoint, err = %e, "unexpected response shape");
            SessionError::Decode(format!("Unexpected response from {}: {e}", req.endpoint))
        })
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value, SessionError> {
        self.request(&Request::get(endpoint)).await
    }

    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Value, SessionError> {
        self.request(&Request::post(endpoint, body)).await
    }

    pub async fn put(&self, endpoint: &str, body: Value) -> Result<Value, SessionError> {
        self.request(&Request::put(endpoint, body)).await
    }

    pub async fn patch(&self, endpoint: &str, body: Value) -> Result<Value, SessionError> {
        self.request(&Request::patch(endpoint, body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value, SessionError> {
        self.request(&Request::delete(endpoint)).await
    }

    /// Exchange the refresh token for a new pair, joining an exchange that is
    /// already in flight instead of starting a second one.
    pub async fn refresh(&self) -> Result<TokenPair, SessionError> {
        let shared = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(pending) => {
                    tracing::debug!("joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let Some(this) = self.this.upgrade() else {
                        return Err(SessionError::AuthInvalid("Session closed".to_owned()));
                    };
                    let pending = async move {
                        let result = this.exchange().await;
                        this.in_flight.lock().take();
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        shared.await
    }

    /// Wait for an in-flight refresh exchange, if any, to settle.
    pub async fn settle_refresh(&self) {
        let pending = self.in_flight.lock().clone();
        if let Some(pending) = pending {
            let _ = pending.await;
        }
    }

    /// Cancel the proactive timer and drop the session everywhere.
    pub fn end_session(&self, last_error: Option<String>) {
        self.scheduler.cancel();
        self.session.clear(last_error);
    }

    async fn exchange(&self) -> Result<TokenPair, SessionError> {
        let epoch = self.session.epoch();
        let Some(refresh_token) = self.session.refresh_token() else {
            let err = SessionError::AuthInvalid("No refresh token available".to_owned());
            self.end_session(Some(err.message().to_owned()));
            return Err(err);
        };

        let req = Request::post("/auth/refresh", json!({ "refreshToken": refresh_token }))
            .without_auth()
            .without_refresh();
        let result = match self.send_once(&req, None).await {
            Ok(value) => serde_json::from_value::<Envelope<TokenGrant>>(value)
                .map(|env| TokenPair::from(env.data))
                .map_err(|e| SessionError::Decode(format!("Unexpected refresh response: {e}"))),
            Err(e) => Err(e),
        };

        match result {
            Ok(pair) => {
                if !self.session.install_tokens(epoch, &pair) {
                    tracing::debug!("session changed during refresh, discarding new tokens");
                    return Err(SessionError::AuthInvalid(
                        "Session ended during token refresh".to_owned(),
                    ));
                }
                self.scheduler.arm(pair.expires_in_secs);
                tracing::info!(expires_in_secs = pair.expires_in_secs, "access token refreshed");
                Ok(pair)
            }
            Err(e) => {
                tracing::warn!(err = %e, kind = e.kind(), "token refresh failed, clearing session");
                if self.session.epoch() == epoch {
                    self.end_session(Some(e.message().to_owned()));
                }
                Err(match e {
                    SessionError::Network(_) => e,
                    other => SessionError::AuthInvalid(other.message().to_owned()),
                })
            }
        }
    }

    /// One HTTP exchange, classified. Never refreshes.
    async fn send_once(&self, req: &Request, token: Option<&str>) -> Result<Value, SessionError> {
        let mut headers = vec![("Content-Type".to_owned(), "application/json".to_owned())];
        headers.extend(req.headers.iter().cloned());
        if let Some(token) = token {
            headers.push(("Authorization".to_owned(), format!("Bearer {token}")));
        }
        let body = match (&req.body, req.method) {
            (Some(body), method) if method != Method::Get => Some(Bytes::from(body.to_string())),
            _ => None,
        };
        let http = HttpRequest {
            method: req.method,
            url: format!("{}{}", self.base_url, req.endpoint),
            headers,
            body,
        };

        tracing::debug!(method = %req.method, endpoint = %req.endpoint, auth = token.is_some(), "sending request");
        let resp = self.transport.send(http).await.map_err(|e| {
            tracing::warn!(endpoint = %req.endpoint, err = %e, "backend unreachable");
            SessionError::Network(NETWORK_FAILURE.to_owned())
        })?;
        tracing::debug!(endpoint = %req.endpoint, status = resp.status, "received response");

        let ok = (200..300).contains(&resp.status);
        let payload = match parse_body(&resp) {
            Ok(payload) => payload,
            Err(e) if ok => {
                return Err(SessionError::Decode(format!("Malformed JSON from {}: {e}", req.endpoint)));
            }
            Err(_) => Value::Null,
        };

        match resp.status {
            _ if ok => Ok(payload),
            401 => {
                let message = extract_message(&payload).unwrap_or_else(|| "Unauthorized".to_owned());
                if req.refreshes_on_401() {
                    Err(SessionError::AuthExpired(message))
                } else {
                    Err(SessionError::AuthInvalid(message))
                }
            }
            status => Err(SessionError::from_status(status, &payload)),
        }
    }
}

impl Refresher for Gateway {
    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<TokenPair, SessionError>> + Send + '_>> {
        Box::pin(Gateway::refresh(self))
    }
}

/// JSON when the response says so, text otherwise. Empty bodies are `null`.
fn parse_body(resp: &HttpResponse) -> Result<Value, serde_json::Error> {
    if resp.body.is_empty() {
        return Ok(Value::Null);
    }
    if resp.is_json() {
        return serde_json::from_slice(&resp.body);
    }
    Ok(Value::String(String::from_utf8_lossy(&resp.body).into_owned()))
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
