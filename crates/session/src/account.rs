// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Password recovery and connectivity checks. None of these carry a token.

use serde_json::json;

use crate::context::SessionContext;
use crate::error::{SessionError, GENERIC_FAILURE};
use crate::gateway::Request;

impl SessionContext {
    /// Ask the backend to email a reset link.
    pub async fn forgot_password(&self, email: &str) -> Result<(), SessionError> {
        let req = Request::post("/auth/forgot-password", json!({ "email": email })).without_auth();
        self.gateway().request(&req).await?;
        tracing::info!("password reset link requested");
        Ok(())
    }

    /// Whether a reset token is still valid.
    ///
    /// Any 2xx means valid, whatever the body. A rejection with a backend
    /// message means invalid. Transport failures and bare server errors are
    /// returned as errors since they say nothing about the token.
    pub async fn validate_reset_token(&self, token: &str) -> Result<bool, SessionError> {
        let endpoint = format!("/auth/reset-password?token={}", urlencode(token));
        match self.gateway().request(&Request::get(endpoint).without_auth()).await {
            Ok(_) | Err(SessionError::Decode(_)) => Ok(true),
            Err(e @ SessionError::Network(_)) => Err(e),
            Err(e @ SessionError::UnknownServer { .. }) if e.message() == GENERIC_FAILURE => Err(e),
            Err(e) => {
                tracing::debug!(err = %e, "reset token rejected");
                Ok(false)
            }
        }
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), SessionError> {
        let req = Request::post(
            "/auth/reset-password",
            json!({ "token": token, "newPassword": new_password }),
        )
        .without_auth();
        self.gateway().request(&req).await?;
        tracing::info!("password reset completed");
        Ok(())
    }

    /// Unauthenticated round-trip to `/public/ping`.
    pub async fn ping(&self) -> Result<(), SessionError> {
        self.gateway().request(&Request::get("/public/ping").without_auth()).await?;
        Ok(())
    }
}

/// Percent-encode a query value (RFC 3986 unreserved set kept as-is).
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
#[path = "account_tests.rs"]
mod tests;
