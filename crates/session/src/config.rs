// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the authenticated session middleware.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL of the IAM service (the refresh endpoint is `{iam_api}/refresh`).
    #[arg(long, env = "CAFFEINE_IAM_API")]
    pub iam_api: String,

    /// Comma-separated URL prefixes that may receive the bearer token.
    #[arg(long, env = "CAFFEINE_TRUSTED_URLS", value_delimiter = ',')]
    pub trusted_urls: Vec<String>,

    /// Directory holding the persisted session. Defaults to the XDG state dir.
    #[arg(long, env = "CAFFEINE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Seconds between unconditional background refreshes.
    #[arg(long, default_value_t = 540, env = "CAFFEINE_REFRESH_INTERVAL_SECS")]
    pub refresh_interval_secs: u64,

    /// Refresh proactively when the access token expires within this many seconds.
    #[arg(long, default_value_t = 60, env = "CAFFEINE_EXPIRY_BUFFER_SECS")]
    pub expiry_buffer_secs: u64,

    /// Timeout for outgoing HTTP requests in seconds.
    #[arg(long, default_value_t = 30, env = "CAFFEINE_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: u64,
}

impl SessionConfig {
    /// Config with defaults for everything except the IAM base and trusted prefixes.
    pub fn new(iam_api: impl Into<String>, trusted_urls: Vec<String>) -> Self {
        Self {
            iam_api: iam_api.into(),
            trusted_urls,
            state_dir: None,
            refresh_interval_secs: 540,
            expiry_buffer_secs: 60,
            http_timeout_secs: 30,
        }
    }

    /// Full URL of the token refresh endpoint.
    pub fn refresh_url(&self) -> String {
        normalize_url(&format!("{}/refresh", self.iam_api.trim().trim_end_matches('/')))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn expiry_buffer(&self) -> Duration {
        Duration::from_secs(self.expiry_buffer_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Resolved state directory: the explicit flag, else [`state_dir`].
    pub fn resolved_state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(state_dir)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.iam_api.trim().is_empty() {
            anyhow::bail!("--iam-api must not be empty");
        }
        if self.refresh_interval_secs == 0 {
            anyhow::bail!("--refresh-interval-secs must be greater than zero");
        }
        Ok(())
    }
}

/// Canonical form of a URL as `reqwest` serializes outgoing requests:
/// lowercase scheme and host, no default port.
///
/// The trailing `/` the parser adds to a bare origin is dropped again so the
/// result stays usable as a prefix. Unparseable input is returned trimmed.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match reqwest::Url::parse(raw) {
        Ok(url) => {
            let normalized = url.as_str();
            if !raw.ends_with('/') && url.path() == "/" && url.query().is_none() {
                normalized.trim_end_matches('/').to_owned()
            } else {
                normalized.to_owned()
            }
        }
        Err(_) => raw.to_owned(),
    }
}

/// Resolve the state directory for persisted sessions.
///
/// Checks `CAFFEINE_STATE_DIR`, then `$XDG_STATE_HOME/caffeine`,
/// then `$HOME/.local/state/caffeine`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CAFFEINE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("caffeine");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/caffeine");
    }
    PathBuf::from(".caffeine")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
