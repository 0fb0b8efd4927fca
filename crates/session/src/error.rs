// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde_json::Value;

/// Fallback message when a backend error body has no recognizable shape.
pub const GENERIC_FAILURE: &str = "Request failed";

/// Message surfaced when the backend could not be reached at all.
pub const NETWORK_FAILURE: &str =
    "Network error: Unable to connect to the server. Please check your internet connection and try again.";

/// Errors surfaced by the gateway and session context.
///
/// `Clone` so a single refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The request never reached the server.
    Network(String),
    /// 401 on a request that may refresh. Handled internally by
    /// refresh-and-retry; carries the backend's message for the final report.
    AuthExpired(String),
    /// 401 after the retry, or the refresh exchange itself failed.
    AuthInvalid(String),
    /// Non-401 4xx carrying a structured backend message.
    Validation { status: u16, message: String },
    /// Any other non-2xx.
    UnknownServer { status: u16, message: String },
    /// A 2xx whose body did not have the expected shape.
    Decode(String),
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "NETWORK",
            Self::AuthExpired(_) => "AUTH_EXPIRED",
            Self::AuthInvalid(_) => "AUTH_INVALID",
            Self::Validation { .. } => "VALIDATION",
            Self::UnknownServer { .. } => "UNKNOWN_SERVER",
            Self::Decode(_) => "DECODE",
        }
    }

    /// Human-readable message, as shown inline next to a form.
    pub fn message(&self) -> &str {
        match self {
            Self::Network(msg) | Self::AuthExpired(msg) | Self::AuthInvalid(msg) | Self::Decode(msg) => {
                msg
            }
            Self::Validation { message, .. } | Self::UnknownServer { message, .. } => message,
        }
    }

    /// HTTP status that produced this error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthExpired(_) | Self::AuthInvalid(_) => Some(401),
            Self::Validation { status, .. } | Self::UnknownServer { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) => None,
        }
    }

    /// True when the session can no longer be used and was cleared.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthExpired(_) | Self::AuthInvalid(_))
    }

    /// Classify a non-2xx, non-401 response.
    pub fn from_status(status: u16, body: &Value) -> Self {
        match extract_message(body) {
            Some(message) if (400..500).contains(&status) => Self::Validation { status, message },
            Some(message) => Self::UnknownServer { status, message },
            None => Self::UnknownServer { status, message: GENERIC_FAILURE.to_owned() },
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for SessionError {}

/// Pull a human-readable message out of a backend error body.
///
/// Shapes are tried in order: `{status, message}`, `{statusCode: {message}}`,
/// a string `data`, a top-level `message`, a top-level `error`.
pub fn extract_message(body: &Value) -> Option<String> {
    let text = |v: Option<&Value>| -> Option<String> {
        v.and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned)
    };

    if truthy(body.get("status")) {
        if let Some(msg) = text(body.get("message")) {
            return Some(msg);
        }
    }
    if let Some(msg) = text(body.get("statusCode").and_then(|s| s.get("message"))) {
        return Some(msg);
    }
    text(body.get("data"))
        .or_else(|| text(body.get("message")))
        .or_else(|| text(body.get("error")))
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
