// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request interceptor pipeline.
//!
//! Every outgoing request runs through [`STAGES`] in order:
//!
//! 1. `expiry-check`: if the access token expires within the buffer (or its
//!    expiry is unreadable) and no refresh is pending, start one without
//!    waiting for it.
//! 2. `refresh-wait`: if a refresh is pending, wait for it to settle. A
//!    refresh this request started in stage 1 is not waited on, and the
//!    refresh call itself never waits.
//! 3. `attach-token`: attach `Authorization: Bearer ...` when authenticated
//!    and the URL starts with a trusted prefix. Never on the refresh call.
//!
//! Waiting happens before attachment, so a request queued behind a refresh
//! carries the refreshed token, or no token if the refresh logged out.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use tracing::{debug, warn};

use crate::config::normalize_url;
use crate::coordinator::RefreshCoordinator;
use crate::credential::store::TokenStore;
use crate::credential::{access_token_expiry, epoch_secs};

/// A named pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExpiryCheck,
    RefreshWait,
    AttachToken,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExpiryCheck => "expiry-check",
            Self::RefreshWait => "refresh-wait",
            Self::AttachToken => "attach-token",
        }
    }
}

/// Execution order of the pipeline.
pub const STAGES: [Stage; 3] = [Stage::ExpiryCheck, Stage::RefreshWait, Stage::AttachToken];

/// URL prefixes allowed to receive the bearer token.
#[derive(Debug, Clone, Default)]
pub struct TrustedDestinations {
    prefixes: Vec<String>,
}

impl TrustedDestinations {
    /// Entries are normalized like outgoing request URLs. Blank entries are
    /// dropped; an empty prefix would match every URL.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(|p| normalize_url(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    pub fn is_trusted(&self, url: &str) -> bool {
        self.prefixes.iter().any(|prefix| url.starts_with(prefix.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

pub struct Pipeline {
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    trusted: TrustedDestinations,
    expiry_buffer: Duration,
}

impl Pipeline {
    pub fn new(
        store: Arc<TokenStore>,
        coordinator: Arc<RefreshCoordinator>,
        trusted: TrustedDestinations,
        expiry_buffer: Duration,
    ) -> Self {
        Self { store, coordinator, trusted, expiry_buffer }
    }

    pub fn stages(&self) -> &'static [Stage] {
        &STAGES
    }

    pub fn trusted(&self) -> &TrustedDestinations {
        &self.trusted
    }

    /// Run a request through every stage.
    pub async fn apply(&self, mut request: reqwest::Request) -> reqwest::Request {
        let mut started = None;
        for stage in STAGES {
            match stage {
                Stage::ExpiryCheck => started = self.check_expiry(request.url().as_str()),
                Stage::RefreshWait => self.wait_for_refresh(request.url().as_str(), started).await,
                Stage::AttachToken => self.attach_token(&mut request),
            }
        }
        request
    }

    fn is_refresh_call(&self, url: &str) -> bool {
        url == self.coordinator.refresh_url()
    }

    /// Returns the id of the refresh started by this check, if any.
    fn check_expiry(&self, url: &str) -> Option<u64> {
        if self.is_refresh_call(url) || self.coordinator.is_refreshing() {
            return None;
        }
        let token = self.store.access_token()?;
        // An unreadable expiry is treated as expired.
        match access_token_expiry(&token) {
            Ok(expires_at) => {
                let now = epoch_secs();
                if now.saturating_add(self.expiry_buffer.as_secs()) < expires_at {
                    return None;
                }
                debug!(expires_at, now, "access token near expiry, refreshing");
            }
            Err(e) => warn!(err = %e, "access token expiry unreadable, refreshing"),
        }
        // Another request may have started one since the check above; that
        // refresh is waited on in the next stage like any other.
        self.coordinator.start_refresh().map(|handle| handle.id())
    }

    async fn wait_for_refresh(&self, url: &str, started: Option<u64>) {
        if self.is_refresh_call(url) {
            return;
        }
        let Some(pending) = self.coordinator.pending() else {
            return;
        };
        if started == Some(pending.id()) {
            return;
        }
        debug!(refresh = pending.id(), url, "waiting for token refresh");
        pending.settled().await;
    }

    fn attach_token(&self, request: &mut reqwest::Request) {
        let url = request.url().as_str();
        if self.is_refresh_call(url) || !self.trusted.is_trusted(url) {
            return;
        }
        let Some(token) = self.store.access_token() else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            Err(e) => warn!(err = %e, "access token is not a valid header value"),
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
