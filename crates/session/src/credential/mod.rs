// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session credential: the access/refresh token pair issued by IAM.
//!
//! The wire and storage shape follows the IAM service:
//! `{"jwt": "...", "refresh_token": {"val": "...", "exp": 1700000000}}`.

pub mod persist;
pub mod refresh;
pub mod store;

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Access token plus the refresh token used to renew it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer access token (a JWT).
    #[serde(rename = "jwt")]
    pub access_token: String,
    pub refresh_token: RefreshToken,
}

/// Long-lived refresh token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    #[serde(rename = "val")]
    pub value: String,
    /// Expiry as epoch seconds.
    #[serde(rename = "exp")]
    pub expires_at: u64,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_value: impl Into<String>,
        refresh_exp: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: RefreshToken { value: refresh_value.into(), expires_at: refresh_exp },
        }
    }
}

#[derive(Deserialize)]
struct ExpClaim {
    exp: u64,
}

/// Decode the `exp` claim (epoch seconds) from a JWT without verifying it.
pub fn access_token_expiry(token: &str) -> Result<u64, SessionError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(SessionError::MalformedToken("expected three segments".into())),
    };
    // Some issuers pad the segments; strip it before decoding.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| SessionError::MalformedToken(format!("payload encoding: {e}")))?;
    let claims: ExpClaim = serde_json::from_slice(&bytes)
        .map_err(|e| SessionError::MalformedToken(format!("payload claims: {e}")))?;
    Ok(claims.exp)
}

/// Return current epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
