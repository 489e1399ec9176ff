// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors raised by the session middleware.
#[derive(Debug)]
pub enum SessionError {
    /// The refresh call failed: transport error, non-2xx, or undecodable body.
    RefreshNetwork(String),
    /// An operation that needs an authenticated session was invoked without one.
    InvalidState(String),
    /// The access token's claims could not be decoded.
    MalformedToken(String),
    /// Durable storage could not be read or written.
    Storage(String),
    /// A request sent through the authenticated client failed.
    Http(reqwest::Error),
    /// A response body could not be decoded.
    Decode(String),
}

impl SessionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefreshNetwork(_) => "REFRESH_NETWORK",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::MalformedToken(_) => "MALFORMED_TOKEN",
            Self::Storage(_) => "STORAGE",
            Self::Http(_) => "HTTP",
            Self::Decode(_) => "DECODE",
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RefreshNetwork(msg) => write!(f, "token refresh failed: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid session state: {msg}"),
            Self::MalformedToken(msg) => write!(f, "malformed access token: {msg}"),
            Self::Storage(msg) => write!(f, "session storage: {msg}"),
            Self::Http(e) => write!(f, "request failed: {e}"),
            Self::Decode(msg) => write!(f, "decode response: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
