// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive token renewal ahead of expiry.
//!
//! At most one timer is armed at a time. Arming replaces the previous timer,
//! and a fired timer goes back to idle before it asks for a refresh. Renewal
//! itself (and re-arming with the new lifetime) is the [`Refresher`]'s job.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::model::TokenPair;
use crate::store::SessionStore;

/// Performs the refresh-token exchange on the scheduler's behalf.
pub trait Refresher: Send + Sync + 'static {
    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<TokenPair, SessionError>> + Send + '_>>;
}

/// How far ahead of expiry to renew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Fire at min(expires_in - margin, expires_in / 2).
    Earliest { margin: Duration },
    /// Fire at max(expires_in - margin, expires_in / 2); never when the
    /// lifetime does not exceed the margin.
    Latest { margin: Duration },
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::Earliest { margin: Duration::from_secs(60) }
    }
}

impl RefreshPolicy {
    /// Delay before renewal, or `None` when the lifetime is too short to
    /// renew proactively.
    pub fn delay_for(&self, expires_in_secs: u64) -> Option<Duration> {
        let lifetime_ms = i128::from(expires_in_secs) * 1000;
        let half_ms = lifetime_ms / 2;
        let delay_ms = match *self {
            Self::Earliest { margin } => (lifetime_ms - margin.as_millis() as i128).min(half_ms),
            Self::Latest { margin } => {
                let margin_ms = margin.as_millis() as i128;
                if lifetime_ms <= margin_ms {
                    return None;
                }
                (lifetime_ms - margin_ms).max(half_ms)
            }
        };
        if delay_ms <= 0 {
            return None;
        }
        Some(Duration::from_millis(u64::try_from(delay_ms).ok()?))
    }
}

/// Details of the currently armed timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedRefresh {
    pub id: String,
    pub expires_in_secs: u64,
    pub delay: Duration,
}

struct Armed {
    info: ArmedRefresh,
    cancel: CancellationToken,
}

/// Single-slot cancellable refresh timer.
pub struct RefreshScheduler {
    policy: RefreshPolicy,
    refresher: Weak<dyn Refresher>,
    store: Option<SessionStore>,
    slot: Arc<Mutex<Option<Armed>>>,
}

impl RefreshScheduler {
    pub fn new(policy: RefreshPolicy, refresher: Weak<dyn Refresher>) -> Self {
        Self { policy, refresher, store: None, slot: Arc::new(Mutex::new(None)) }
    }

    /// Mirror the armed timer id into `store` as a cleanup hint.
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Cancel any armed timer, then arm a new one for a token that expires
    /// in `expires_in_secs`. Returns the chosen delay, or `None` if the
    /// lifetime is too short and the timer stays idle.
    pub fn arm(&self, expires_in_secs: u64) -> Option<Duration> {
        self.cancel();

        let Some(delay) = self.policy.delay_for(expires_in_secs) else {
            tracing::debug!(expires_in_secs, "lifetime too short, not arming proactive refresh");
            return None;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, not arming proactive refresh");
            return None;
        };

        let id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let info = ArmedRefresh { id: id.clone(), expires_in_secs, delay };

        let slot = Arc::clone(&self.slot);
        let store = self.store.clone();
        let refresher = self.refresher.clone();
        let token = cancel.clone();
        let mut guard = self.slot.lock();
        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            {
                let mut slot = slot.lock();
                if token.is_cancelled() || slot.as_ref().map(|a| a.info.id.as_str()) != Some(id.as_str()) {
                    return;
                }
                *slot = None;
                if let Some(ref store) = store {
                    store.clear_timer_hint();
                }
            }
            let Some(refresher) = refresher.upgrade() else {
                return;
            };
            tracing::debug!(expires_in_secs, "proactive refresh firing");
            if let Err(e) = refresher.refresh().await {
                tracing::warn!(err = %e, "proactive refresh failed");
            }
        });
        if let Some(ref store) = self.store {
            store.set_timer_hint(&info.id);
        }
        tracing::debug!(expires_in_secs, delay_ms = delay.as_millis() as u64, "proactive refresh armed");
        *guard = Some(Armed { info, cancel });
        Some(delay)
    }

    /// Disarm. Safe to call when idle.
    pub fn cancel(&self) {
        let previous = self.slot.lock().take();
        if let Some(armed) = previous {
            armed.cancel.cancel();
            if let Some(ref store) = self.store {
                store.clear_timer_hint();
            }
            tracing::debug!(id = %armed.info.id, "proactive refresh cancelled");
        }
    }

    pub fn armed(&self) -> Option<ArmedRefresh> {
        self.slot.lock().as_ref().map(|a| a.info.clone())
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(armed) = self.slot.lock().take() {
            armed.cancel.cancel();
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
