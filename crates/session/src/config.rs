// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::scheduler::RefreshPolicy;

/// Which proactive refresh formula to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PolicyKind {
    /// min(expires_in - margin, expires_in / 2)
    #[default]
    Earliest,
    /// max(expires_in - margin, expires_in / 2), never when expires_in <= margin
    Latest,
}

/// Configuration for the session manager.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL of the auth backend, including the `/api` prefix.
    #[arg(long, default_value = "http://localhost:8000/api", env = "AUTH_API_URL")]
    pub api_url: String,

    /// Transport timeout for a single HTTP exchange, in milliseconds.
    #[arg(long, default_value_t = 30000, env = "AUTH_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Seconds before expiry at which the proactive refresh may fire.
    #[arg(long, default_value_t = 60, env = "AUTH_REFRESH_MARGIN_SECS")]
    pub refresh_margin_secs: u64,

    /// Proactive refresh formula.
    #[arg(long, value_enum, default_value_t = PolicyKind::Earliest, env = "AUTH_REFRESH_POLICY")]
    pub refresh_policy: PolicyKind,

    /// Directory for the persisted session file.
    #[arg(long, env = "AUTH_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api".to_owned(),
            request_timeout_ms: 30000,
            refresh_margin_secs: 60,
            refresh_policy: PolicyKind::Earliest,
            state_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        let margin = Duration::from_secs(self.refresh_margin_secs);
        match self.refresh_policy {
            PolicyKind::Earliest => RefreshPolicy::Earliest { margin },
            PolicyKind::Latest => RefreshPolicy::Latest { margin },
        }
    }

    /// Resolve the state directory for the persisted session.
    ///
    /// Uses `--state-dir` if set, then `$XDG_STATE_HOME/authsession`,
    /// then `$HOME/.local/state/authsession`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("authsession");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/authsession");
        }
        PathBuf::from(".authsession")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
