// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end session behavior.
//!
//! Wires a real [`AuthSessionManager`] to a mock IAM service over in-memory
//! storage.

use std::sync::Arc;
use std::time::Duration;

use caffeine_session::credential::persist::{MemoryStorage, Storage};
use caffeine_session::test_support::MockIam;
use caffeine_session::{AuthSessionManager, SessionConfig, SessionEvent};
use tokio::sync::broadcast;

/// A session manager talking to a mock IAM service.
///
/// `{base}/api` is the only trusted prefix; every other path on the mock
/// server is reachable but untrusted.
pub struct Harness {
    pub iam: MockIam,
    pub storage: MemoryStorage,
    pub manager: AuthSessionManager,
}

impl Harness {
    pub async fn start(responses: Vec<(u16, String)>) -> anyhow::Result<Self> {
        Self::with_iam(MockIam::start(responses).await?)
    }

    /// Like [`Harness::start`], but refresh calls park until released.
    pub async fn start_held(responses: Vec<(u16, String)>) -> anyhow::Result<Self> {
        Self::with_iam(MockIam::start_held(responses).await?)
    }

    fn with_iam(iam: MockIam) -> anyhow::Result<Self> {
        let storage = MemoryStorage::new();
        let manager = session_for(&iam, Arc::new(storage.clone()))?;
        Ok(Self { iam, storage, manager })
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api{path}", self.iam.base_url())
    }

    pub fn untrusted_url(&self, path: &str) -> String {
        format!("{}/public{path}", self.iam.base_url())
    }

    /// Simulate a process restart: a fresh manager over the same storage.
    pub fn restart(&self) -> anyhow::Result<AuthSessionManager> {
        session_for(&self.iam, Arc::new(self.storage.clone()))
    }

    /// GET a URL through the session client and return the echoed
    /// `Authorization` header.
    pub async fn echo_authorization(&self, url: &str) -> anyhow::Result<Option<String>> {
        let body = self.manager.client().get_json(url).await?;
        Ok(body["authorization"].as_str().map(str::to_owned))
    }
}

fn session_for(iam: &MockIam, storage: Arc<dyn Storage>) -> anyhow::Result<AuthSessionManager> {
    let mut config = SessionConfig::new(iam.base_url(), vec![format!("{}/api", iam.base_url())]);
    config.http_timeout_secs = 10;
    Ok(AuthSessionManager::new(config, storage)?)
}

/// Drain every event currently queued on `rx`.
pub fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
