// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh coordinator: at most one token refresh in flight.
//!
//! The coordinator is a two-state machine, `Idle` or `Refreshing(handle)`.
//! The check-and-set from `Idle` to `Refreshing` happens inside one critical
//! section, so concurrent triggers always collapse into the same operation.
//! The handle is a shared future; every caller that needs the result awaits a
//! clone of it instead of polling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::config::normalize_url;
use crate::credential::refresh::do_refresh;
use crate::credential::store::TokenStore;
use crate::events::SessionEvent;

/// How a refresh operation settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The access token was replaced.
    Refreshed,
    /// The refresh call failed and the session was logged out.
    Failed,
    /// The session changed while the call was in flight; the result was dropped.
    Superseded,
}

/// A clonable reference to an in-flight refresh operation.
#[derive(Clone)]
pub struct RefreshHandle {
    id: u64,
    outcome: Shared<BoxFuture<'static, RefreshOutcome>>,
}

impl RefreshHandle {
    /// Identifier of the operation, unique for the coordinator's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the operation to settle.
    pub async fn settled(self) -> RefreshOutcome {
        self.outcome.await
    }
}

impl std::fmt::Debug for RefreshHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshHandle").field("id", &self.id).finish()
    }
}

enum Phase {
    Idle,
    Refreshing(RefreshHandle),
}

pub struct RefreshCoordinator {
    phase: Mutex<Phase>,
    next_id: AtomicU64,
    store: Arc<TokenStore>,
    http: reqwest::Client,
    refresh_url: String,
    last_error: Mutex<Option<String>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<TokenStore>,
        http: reqwest::Client,
        refresh_url: String,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            phase: Mutex::new(Phase::Idle),
            next_id: AtomicU64::new(1),
            store,
            http,
            refresh_url: normalize_url(&refresh_url),
            last_error: Mutex::new(None),
            event_tx,
        })
    }

    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }

    /// Start a refresh, or join the one already in flight.
    ///
    /// Returns `None` when there is no session to refresh. The network call
    /// runs on a spawned task, so this must be called inside a Tokio runtime.
    pub fn trigger_refresh(self: &Arc<Self>) -> Option<RefreshHandle> {
        self.acquire().map(|(handle, _)| handle)
    }

    /// Start a refresh unless one is already in flight.
    ///
    /// Returns the handle only when this call started the operation; joining
    /// an existing one yields `None`.
    pub fn start_refresh(self: &Arc<Self>) -> Option<RefreshHandle> {
        match self.acquire()? {
            (handle, true) => Some(handle),
            (_, false) => None,
        }
    }

    /// The in-flight handle, plus whether this call created it.
    fn acquire(self: &Arc<Self>) -> Option<(RefreshHandle, bool)> {
        let mut phase = self.phase.lock();
        if let Phase::Refreshing(handle) = &*phase {
            debug!(refresh = handle.id, "refresh already in flight");
            return Some((handle.clone(), false));
        }
        let refresh_token = self.store.refresh_token()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        let outcome =
            async move { done_rx.await.unwrap_or(RefreshOutcome::Failed) }.boxed().shared();
        let handle = RefreshHandle { id, outcome };
        *phase = Phase::Refreshing(handle.clone());
        drop(phase);

        debug!(refresh = id, "token refresh started");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = this.run(&refresh_token).await;
            // Back to idle before waiters resume, so they observe the settled state.
            *this.phase.lock() = Phase::Idle;
            let _ = done_tx.send(outcome);
        });
        Some((handle, true))
    }

    /// The in-flight refresh, if any.
    pub fn pending(&self) -> Option<RefreshHandle> {
        match &*self.phase.lock() {
            Phase::Refreshing(handle) => Some(handle.clone()),
            Phase::Idle => None,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Refreshing(_))
    }

    /// Message of the most recent failed refresh. Cleared by a successful one.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    async fn run(&self, refresh_token: &str) -> RefreshOutcome {
        let result = do_refresh(&self.http, &self.refresh_url, refresh_token).await;
        // A result only applies to the session it was requested for.
        if self.store.refresh_token().as_deref() != Some(refresh_token) {
            match &result {
                Ok(_) => warn!("session changed during refresh, discarding new token"),
                Err(e) => warn!(err = %e, "session changed during refresh, ignoring failure"),
            }
            return RefreshOutcome::Superseded;
        }
        match result {
            Ok(resp) => {
                match self.store.update_access_token(resp.jwt) {
                    Ok(()) => {
                        *self.last_error.lock() = None;
                        info!("access token refreshed");
                        RefreshOutcome::Refreshed
                    }
                    Err(e) => {
                        warn!(err = %e, "session ended during refresh");
                        RefreshOutcome::Superseded
                    }
                }
            }
            Err(e) => {
                let error = e.to_string();
                warn!(err = %error, "token refresh failed, logging out");
                self.store.logout();
                *self.last_error.lock() = Some(error.clone());
                let _ = self.event_tx.send(SessionEvent::RefreshFailed { error });
                RefreshOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
