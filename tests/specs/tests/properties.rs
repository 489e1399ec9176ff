// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session guarantees exercised end to end against a mock IAM service.

use std::time::Duration;

use futures_util::future::join_all;

use caffeine_session::credential::persist::CREDENTIAL_KEY;
use caffeine_session::test_support::{credential_expiring_in, refresh_body};
use caffeine_session::{RefreshOutcome, SessionEvent};
use caffeine_specs::{drain_events, wait_until, Harness};

const TIMEOUT: Duration = Duration::from_secs(10);

// -- Refresh coordination -----------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_share_one_refresh_call() -> anyhow::Result<()> {
    let h = Harness::start_held(vec![(200, refresh_body())]).await?;
    h.manager.login(credential_expiring_in(3600));

    let handles: Vec<_> = (0..8).filter_map(|_| h.manager.refresh()).collect();
    assert_eq!(handles.len(), 8);
    assert!(handles.iter().all(|handle| handle.id() == handles[0].id()));

    h.iam.wait_for_refresh_calls(1, TIMEOUT).await?;
    h.iam.release();
    let outcomes = join_all(handles.into_iter().map(|handle| handle.settled())).await;

    assert!(outcomes.iter().all(|o| *o == RefreshOutcome::Refreshed));
    assert_eq!(h.iam.refresh_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn refresh_call_bypasses_pending_refresh() -> anyhow::Result<()> {
    let h = Harness::start_held(vec![(200, refresh_body())]).await?;
    h.manager.login(credential_expiring_in(3600));
    let pending = h.manager.refresh();
    assert!(pending.is_some());
    h.iam.wait_for_refresh_calls(1, TIMEOUT).await?;

    // Issue the refresh call itself through the session client.
    let client = h.manager.client();
    let refresh_url = h.iam.refresh_url();
    let direct = tokio::spawn(async move {
        client
            .post_json(&refresh_url, &serde_json::json!({ "refresh_token": "refresh-initial" }))
            .await
    });

    // It reaches IAM while the first refresh is still parked.
    h.iam.wait_for_refresh_calls(2, TIMEOUT).await?;
    assert!(h.manager.pending_refresh().is_some());

    h.iam.release();
    let body = tokio::time::timeout(TIMEOUT, direct).await???;
    assert!(body["jwt"].is_string());
    Ok(())
}

// -- Token attachment ---------------------------------------------------------

#[tokio::test]
async fn token_only_sent_to_trusted_prefixes() -> anyhow::Result<()> {
    let h = Harness::start(vec![(200, refresh_body())]).await?;
    let cred = credential_expiring_in(3600);
    h.manager.login(cred.clone());

    let expected = format!("Bearer {}", cred.access_token);
    assert_eq!(h.echo_authorization(&h.api_url("/projects")).await?, Some(expected));
    assert_eq!(h.echo_authorization(&h.untrusted_url("/x")).await?, None);
    Ok(())
}

#[tokio::test]
async fn near_expiry_request_triggers_refresh_without_blocking() -> anyhow::Result<()> {
    let h = Harness::start_held(vec![(200, refresh_body())]).await?;
    let cred = credential_expiring_in(30);
    h.manager.login(cred.clone());

    // Completes while the refresh it started is still parked at IAM.
    let auth = tokio::time::timeout(TIMEOUT, h.echo_authorization(&h.api_url("/a"))).await??;
    assert_eq!(auth, Some(format!("Bearer {}", cred.access_token)));
    h.iam.wait_for_refresh_calls(1, TIMEOUT).await?;
    assert!(h.manager.pending_refresh().is_some());

    h.iam.release();
    wait_until(TIMEOUT, || h.manager.pending_refresh().is_none()).await?;
    assert_eq!(h.iam.refresh_calls(), 1);
    let refreshed = h.manager.credential().map(|c| c.access_token);
    assert_ne!(refreshed.as_deref(), Some(cred.access_token.as_str()));
    Ok(())
}

// -- Session lifecycle --------------------------------------------------------

#[tokio::test]
async fn logout_clears_memory_and_storage() -> anyhow::Result<()> {
    let h = Harness::start(vec![(200, refresh_body())]).await?;
    h.manager.login(credential_expiring_in(3600));
    assert!(h.storage.contains(CREDENTIAL_KEY));

    h.manager.logout();

    assert!(!h.manager.is_authenticated());
    assert_eq!(h.manager.credential(), None);
    assert!(!h.storage.contains(CREDENTIAL_KEY));
    Ok(())
}

#[tokio::test]
async fn restore_after_restart_yields_same_credential() -> anyhow::Result<()> {
    let h = Harness::start(vec![(200, refresh_body())]).await?;
    let cred = credential_expiring_in(3600);
    h.manager.login(cred.clone());

    let restarted = h.restart()?;
    assert!(restarted.restore()?);
    assert!(restarted.is_authenticated());
    assert_eq!(restarted.credential(), Some(cred));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refresh_failure_releases_waiters_anonymously() -> anyhow::Result<()> {
    let h = Harness::start_held(vec![(503, r#"{"error":"unavailable"}"#.to_owned())]).await?;
    h.manager.login(credential_expiring_in(3600));
    let mut events = h.manager.subscribe();
    assert!(h.manager.refresh().is_some());
    h.iam.wait_for_refresh_calls(1, TIMEOUT).await?;

    let waiters: Vec<_> = (0..3)
        .map(|i| {
            let client = h.manager.client();
            let url = h.api_url(&format!("/items/{i}"));
            tokio::spawn(async move { client.get_json(&url).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(waiters.iter().all(|w| !w.is_finished()));

    h.iam.release();
    for waiter in waiters {
        let body = tokio::time::timeout(TIMEOUT, waiter).await???;
        assert_eq!(body["authorization"], serde_json::Value::Null);
    }

    assert!(!h.manager.is_authenticated());
    assert!(h.manager.last_refresh_error().is_some());
    let failures = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::RefreshFailed { .. }))
        .count();
    assert_eq!(failures, 1);
    Ok(())
}
