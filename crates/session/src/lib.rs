// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caffeine session: bearer-token session middleware for the Caffeine
//! platform's backend services.

pub mod cli;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod refresh_loop;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use std::sync::Once;

pub use crate::client::AuthClient;
pub use crate::config::SessionConfig;
pub use crate::coordinator::{RefreshHandle, RefreshOutcome};
pub use crate::credential::Credential;
pub use crate::error::SessionError;
pub use crate::events::SessionEvent;
pub use crate::session::AuthSessionManager;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
