// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: constructed once at startup and passed by reference to
//! whatever needs an authenticated client or session state.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::AuthClient;
use crate::config::SessionConfig;
use crate::coordinator::{RefreshCoordinator, RefreshHandle};
use crate::credential::persist::Storage;
use crate::credential::store::TokenStore;
use crate::credential::Credential;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::pipeline::{Pipeline, TrustedDestinations};
use crate::refresh_loop::spawn_refresh_loop;

pub struct AuthSessionManager {
    config: SessionConfig,
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    client: AuthClient,
    event_tx: broadcast::Sender<SessionEvent>,
    refresh_loop: Mutex<Option<JoinHandle<()>>>,
}

impl AuthSessionManager {
    pub fn new(config: SessionConfig, storage: Arc<dyn Storage>) -> Result<Self, SessionError> {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(config.http_timeout()).build()?;

        let (event_tx, _) = broadcast::channel(64);
        let store = Arc::new(TokenStore::new(storage, event_tx.clone()));
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store),
            http.clone(),
            config.refresh_url(),
            event_tx.clone(),
        );
        let trusted = TrustedDestinations::new(&config.trusted_urls);
        debug!(prefixes = ?trusted.prefixes(), "trusted destinations configured");
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            Arc::clone(&coordinator),
            trusted,
            config.expiry_buffer(),
        ));
        let client = AuthClient::new(http, pipeline);

        Ok(Self { config, store, coordinator, client, event_tx, refresh_loop: Mutex::new(None) })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Restore a persisted session. Call once at startup, before sending requests.
    pub fn restore(&self) -> Result<bool, SessionError> {
        self.store.restore()
    }

    pub fn login(&self, credential: Credential) {
        self.store.login(credential);
    }

    pub fn logout(&self) -> bool {
        self.store.logout()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.store.credential()
    }

    /// Trigger a refresh, or join the one in flight.
    pub fn refresh(&self) -> Option<RefreshHandle> {
        self.coordinator.trigger_refresh()
    }

    pub fn pending_refresh(&self) -> Option<RefreshHandle> {
        self.coordinator.pending()
    }

    pub fn last_refresh_error(&self) -> Option<String> {
        self.coordinator.last_error()
    }

    /// Client that runs every request through the interceptor pipeline.
    pub fn client(&self) -> AuthClient {
        self.client.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Start the periodic refresh loop. Returns `false` if it is already running.
    pub fn spawn_refresh_loop(&self, shutdown: CancellationToken) -> bool {
        let mut slot = self.refresh_loop.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("refresh loop already running");
            return false;
        }
        info!("starting periodic token refresh");
        *slot = Some(spawn_refresh_loop(
            Arc::clone(&self.coordinator),
            self.config.refresh_interval(),
            shutdown,
        ));
        true
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
