// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token store: sole owner of the session credential.
//!
//! Every mutation writes through to durable storage before the lock is
//! released, so storage never disagrees with memory.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::credential::persist::{Storage, CREDENTIAL_KEY};
use crate::credential::Credential;
use crate::error::SessionError;
use crate::events::SessionEvent;

pub struct TokenStore {
    /// `Some` exactly when the session is authenticated.
    credential: Mutex<Option<Credential>>,
    storage: Arc<dyn Storage>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>, event_tx: broadcast::Sender<SessionEvent>) -> Self {
        Self { credential: Mutex::new(None), storage, event_tx }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.lock().is_some()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.credential.lock().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.credential.lock().as_ref().map(|c| c.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.credential.lock().as_ref().map(|c| c.refresh_token.value.clone())
    }

    /// Start an authenticated session with the given credential.
    pub fn login(&self, credential: Credential) {
        {
            let mut slot = self.credential.lock();
            self.persist(&credential);
            *slot = Some(credential);
        }
        info!("session logged in");
        let _ = self.event_tx.send(SessionEvent::LoggedIn);
    }

    /// Replace only the access token of the current credential.
    pub fn update_access_token(&self, access_token: String) -> Result<(), SessionError> {
        {
            let mut slot = self.credential.lock();
            let Some(credential) = slot.as_mut() else {
                error!("access token update without an authenticated session");
                return Err(SessionError::InvalidState("no credential to update".into()));
            };
            credential.access_token = access_token;
            self.persist(credential);
        }
        debug!("access token updated");
        let _ = self.event_tx.send(SessionEvent::TokenRefreshed);
        Ok(())
    }

    /// Clear the session. Returns whether a session was actually cleared.
    pub fn logout(&self) -> bool {
        let cleared = {
            let mut slot = self.credential.lock();
            if let Err(e) = self.storage.remove(CREDENTIAL_KEY) {
                warn!(err = %e, "failed to remove persisted session");
            }
            slot.take().is_some()
        };
        if cleared {
            info!("session logged out");
            let _ = self.event_tx.send(SessionEvent::LoggedOut);
        }
        cleared
    }

    /// Load a persisted credential, if any. Returns whether a session was restored.
    ///
    /// A persisted value that no longer parses is discarded.
    pub fn restore(&self) -> Result<bool, SessionError> {
        let Some(raw) = self.storage.get(CREDENTIAL_KEY)? else {
            debug!("no persisted session");
            return Ok(false);
        };
        let credential: Credential = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                warn!(err = %e, "discarding unreadable persisted session");
                self.storage.remove(CREDENTIAL_KEY)?;
                return Ok(false);
            }
        };
        *self.credential.lock() = Some(credential);
        info!("session restored from storage");
        let _ = self.event_tx.send(SessionEvent::LoggedIn);
        Ok(true)
    }

    fn persist(&self, credential: &Credential) {
        let result = serde_json::to_string(credential)
            .map_err(|e| SessionError::Storage(format!("serialize credential: {e}")))
            .and_then(|json| self.storage.set(CREDENTIAL_KEY, &json));
        if let Err(e) = result {
            warn!(err = %e, "failed to persist session");
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
