// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a mock IAM service, token builders, and
//! assertion helpers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::credential::{epoch_secs, Credential};

/// Build an unsigned JWT whose payload carries the given `exp` claim.
pub fn make_jwt(exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user-1","exp":{exp}}}"#));
    format!("{header}.{payload}.signature")
}

/// Credential whose access token expires `secs` seconds from now.
pub fn credential_expiring_in(secs: u64) -> Credential {
    Credential::new(make_jwt(epoch_secs() + secs), "refresh-initial", epoch_secs() + 86_400)
}

/// Refresh response body carrying a fresh access token valid for an hour.
pub fn refresh_body() -> String {
    serde_json::json!({ "jwt": make_jwt(epoch_secs() + 3600) }).to_string()
}

/// Mock IAM service.
///
/// `POST /refresh` answers with the configured `(status, body)` sequence (the
/// last entry repeats). Every other path echoes the `Authorization` header it
/// received as `{"authorization": ...}`. A held server parks refresh calls
/// until [`MockIam::release`] is called.
pub struct MockIam {
    addr: SocketAddr,
    refresh_calls: Arc<AtomicU32>,
    refresh_bodies: Arc<Mutex<Vec<serde_json::Value>>>,
    gate: watch::Sender<bool>,
}

impl MockIam {
    /// Start a server that answers refresh calls immediately.
    pub async fn start(responses: Vec<(u16, String)>) -> anyhow::Result<Self> {
        Self::spawn(responses, true).await
    }

    /// Start a server that parks refresh calls until released.
    pub async fn start_held(responses: Vec<(u16, String)>) -> anyhow::Result<Self> {
        Self::spawn(responses, false).await
    }

    async fn spawn(responses: Vec<(u16, String)>, open: bool) -> anyhow::Result<Self> {
        let refresh_calls = Arc::new(AtomicU32::new(0));
        let refresh_bodies = Arc::new(Mutex::new(Vec::new()));
        let (gate, _) = watch::channel(open);
        let responses = Arc::new(responses);

        let refresh = {
            let calls = Arc::clone(&refresh_calls);
            let bodies = Arc::clone(&refresh_bodies);
            let gate_rx = gate.subscribe();
            post(move |body: String| {
                let calls = Arc::clone(&calls);
                let bodies = Arc::clone(&bodies);
                let resps = Arc::clone(&responses);
                let mut gate_rx = gate_rx.clone();
                async move {
                    let idx = calls.fetch_add(1, Ordering::SeqCst) as usize;
                    if let Ok(value) = serde_json::from_str(&body) {
                        bodies.lock().push(value);
                    }
                    let _ = gate_rx.wait_for(|open| *open).await;
                    let (status, body) = resps
                        .get(idx)
                        .or(resps.last())
                        .cloned()
                        .unwrap_or((500, "{}".to_owned()));
                    let status =
                        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    (status, body)
                }
            })
        };

        let app = Router::new().route("/refresh", refresh).fallback(echo_authorization);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self { addr, refresh_calls, refresh_bodies, gate })
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn refresh_url(&self) -> String {
        format!("{}/refresh", self.base_url())
    }

    /// Number of refresh calls received so far (including parked ones).
    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// JSON bodies of the refresh calls received so far.
    pub fn refresh_bodies(&self) -> Vec<serde_json::Value> {
        self.refresh_bodies.lock().clone()
    }

    /// Let parked and future refresh calls answer.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Wait until at least `n` refresh calls have arrived.
    pub async fn wait_for_refresh_calls(&self, n: u32, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.refresh_calls() < n {
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("expected {n} refresh calls, saw {}", self.refresh_calls());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    }
}

async fn echo_authorization(headers: HeaderMap, uri: Uri) -> Json<serde_json::Value> {
    let authorization = headers.get("authorization").and_then(|v| v.to_str().ok());
    Json(serde_json::json!({ "path": uri.path(), "authorization": authorization }))
}

/// Assert that a `Result` is `Err` and its message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
