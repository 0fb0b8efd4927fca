// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit tests: a scripted transport and a fake refresher.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::SessionError;
use crate::model::{TokenPair, UserProfile};
use crate::scheduler::Refresher;
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};

pub const BASE_URL: &str = "http://backend.test/api";

pub fn pair(access: &str, refresh: &str, expires_in_secs: u64) -> TokenPair {
    TokenPair {
        access_token: access.to_owned(),
        refresh_token: refresh.to_owned(),
        expires_in_secs,
    }
}

pub fn alice() -> UserProfile {
    UserProfile {
        id: 7,
        name: "Alice".to_owned(),
        email: "alice@example.com".to_owned(),
        email_verified: true,
        image_url: None,
        provider: "local".to_owned(),
    }
}

/// `{data:{...}}` body for a token endpoint.
pub fn grant(access: &str, refresh: &str, expires_in: u64) -> Value {
    json!({"data": {
        "accessToken": access,
        "refreshToken": refresh,
        "tokenType": "Bearer",
        "expiresIn": expires_in,
    }})
}

/// Scripted outcome of one exchange.
pub struct Reply {
    status: u16,
    content_type: Option<&'static str>,
    body: Bytes,
    delay: Duration,
    unreachable: bool,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: Some("application/json"),
            body: Bytes::from(body.to_string()),
            delay: Duration::ZERO,
            unreachable: false,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8"),
            body: Bytes::from(body.to_owned()),
            delay: Duration::ZERO,
            unreachable: false,
        }
    }

    /// Arbitrary body bytes with a JSON content type.
    pub fn raw_json(status: u16, body: &str) -> Self {
        Self { body: Bytes::from(body.to_owned()), ..Self::json(status, Value::Null) }
    }

    pub fn unauthorized() -> Self {
        Self::json(401, json!({"status": 401, "message": "Unauthorized"}))
    }

    pub fn unreachable() -> Self {
        Self { unreachable: true, ..Self::text(0, "") }
    }

    /// Hold the reply back for `delay` (tokio time).
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = dyn Fn(&HttpRequest) -> Reply + Send + Sync;

/// In-memory [`Transport`] answering from a closure and recording requests.
pub struct MockTransport {
    handler: Box<Handler>,
    log: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { handler: Box::new(handler), log: Mutex::new(Vec::new()) })
    }

    /// Every request sent so far whose path (after the base URL) is `path`.
    pub fn requests(&self, path: &str) -> Vec<HttpRequest> {
        self.log.lock().iter().filter(|r| path_of(r) == path).cloned().collect()
    }

    pub fn calls(&self, path: &str) -> usize {
        self.requests(path).len()
    }
}

impl Transport for MockTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HttpResponse>> + Send + '_>> {
        let reply = (self.handler)(&request);
        self.log.lock().push(request);
        Box::pin(async move {
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            if reply.unreachable {
                anyhow::bail!("connection refused");
            }
            Ok(HttpResponse {
                status: reply.status,
                content_type: reply.content_type.map(str::to_owned),
                body: reply.body,
            })
        })
    }
}

/// Path of a request relative to [`BASE_URL`], without the query string.
pub fn path_of(request: &HttpRequest) -> &str {
    let rest = request.url.strip_prefix(BASE_URL).unwrap_or(&request.url);
    rest.split('?').next().unwrap_or(rest)
}

/// Route helper for handlers: method and path match.
pub fn is(request: &HttpRequest, method: Method, path: &str) -> bool {
    request.method == method && path_of(request) == path
}

pub fn json_body(request: &HttpRequest) -> Value {
    request
        .body
        .as_ref()
        .and_then(|b| serde_json::from_slice(b).ok())
        .unwrap_or(Value::Null)
}

/// [`Refresher`] that counts calls and answers with a fixed outcome.
pub struct FakeRefresher {
    calls: AtomicU32,
    outcome: Mutex<Result<TokenPair, SessionError>>,
}

impl FakeRefresher {
    pub fn succeeding(pair: TokenPair) -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0), outcome: Mutex::new(Ok(pair)) })
    }

    pub fn failing(err: SessionError) -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0), outcome: Mutex::new(Err(err)) })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Refresher for FakeRefresher {
    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<TokenPair, SessionError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome.lock().clone();
        Box::pin(async move { outcome })
    }
}
