// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IAM token refresh call.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Body of `POST {iam}/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response of `POST {iam}/refresh`.
///
/// IAM may also rotate the refresh token; only the access token is consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub jwt: String,
}

/// Perform a single token refresh request. No retries.
pub async fn do_refresh(
    client: &reqwest::Client,
    refresh_url: &str,
    refresh_token: &str,
) -> Result<RefreshResponse, SessionError> {
    let resp = client
        .post(refresh_url)
        .json(&RefreshRequest { refresh_token: refresh_token.to_owned() })
        .send()
        .await
        .map_err(|e| SessionError::RefreshNetwork(format!("HTTP error: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(SessionError::RefreshNetwork(format!("HTTP {status}: {text}")));
    }

    resp.json::<RefreshResponse>()
        .await
        .map_err(|e| SessionError::RefreshNetwork(format!("parse response: {e}")))
}
