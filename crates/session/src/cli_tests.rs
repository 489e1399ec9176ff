// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use super::{execute, Cli, Command, Status};
use crate::assert_err_contains;
use crate::config::SessionConfig;
use crate::credential::persist::{MemoryStorage, CREDENTIAL_KEY};
use crate::session::AuthSessionManager;
use crate::test_support::{credential_expiring_in, refresh_body, MockIam};

const WAIT: Duration = Duration::from_secs(5);

fn manager_for(iam: &MockIam, storage: &MemoryStorage) -> anyhow::Result<AuthSessionManager> {
    let config = SessionConfig::new(iam.base_url(), vec![format!("{}/api", iam.base_url())]);
    Ok(AuthSessionManager::new(config, Arc::new(storage.clone()))?)
}

async fn run_command(command: Command, manager: &AuthSessionManager) -> anyhow::Result<String> {
    let mut out = Vec::new();
    execute(&command, manager, &mut out, CancellationToken::new()).await?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn parses_subcommand_after_session_flags() -> anyhow::Result<()> {
    let cli = Cli::try_parse_from([
        "caffeine-session",
        "--iam-api",
        "https://iam.example.com",
        "--log-format",
        "json",
        "get",
        "https://api.example.com/projects",
    ])?;
    cli.validate()?;
    assert_eq!(cli.log_format, "json");
    assert_eq!(cli.log_level, "info");
    assert!(matches!(cli.command, Command::Get { ref url } if url.ends_with("/projects")));
    Ok(())
}

#[test]
fn rejects_unknown_log_format() -> anyhow::Result<()> {
    let cli = Cli::try_parse_from([
        "caffeine-session",
        "--iam-api",
        "https://iam.example.com",
        "--log-format",
        "xml",
        "status",
    ])?;
    assert_err_contains!(cli.validate(), "--log-format");
    Ok(())
}

#[test]
fn subcommand_is_required() {
    let result = Cli::try_parse_from(["caffeine-session", "--iam-api", "https://iam.example.com"]);
    assert!(result.is_err());
}

#[tokio::test]
async fn login_reads_credential_file() -> anyhow::Result<()> {
    let iam = MockIam::start(vec![(200, refresh_body())]).await?;
    let storage = MemoryStorage::new();
    let manager = manager_for(&iam, &storage)?;
    let cred = credential_expiring_in(3600);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("credential.json");
    std::fs::write(&path, serde_json::to_string(&cred)?)?;

    let out = run_command(Command::Login { credential: path }, &manager).await?;
    let status: serde_json::Value = serde_json::from_str(out.trim())?;
    assert_eq!(status["authenticated"], true);
    assert_eq!(status["refresh_expires_at"], cred.refresh_token.expires_at);
    assert!(status["access_expires_at"].is_u64());
    assert!(storage.contains(CREDENTIAL_KEY));
    Ok(())
}

#[tokio::test]
async fn login_rejects_malformed_credential() -> anyhow::Result<()> {
    let iam = MockIam::start(vec![(200, refresh_body())]).await?;
    let storage = MemoryStorage::new();
    let manager = manager_for(&iam, &storage)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("credential.json");
    std::fs::write(&path, r#"{"jwt":"abc"}"#)?;

    assert!(run_command(Command::Login { credential: path }, &manager).await.is_err());
    assert!(!manager.is_authenticated());
    assert!(!storage.contains(CREDENTIAL_KEY));
    Ok(())
}

#[tokio::test]
async fn status_reports_anonymous_session() -> anyhow::Result<()> {
    let iam = MockIam::start(vec![(200, refresh_body())]).await?;
    let manager = manager_for(&iam, &MemoryStorage::new())?;

    assert_eq!(
        Status::of(&manager),
        Status {
            authenticated: false,
            access_expires_at: None,
            refresh_expires_at: None,
            refreshing: false,
            last_refresh_error: None,
        }
    );
    let out = run_command(Command::Status, &manager).await?;
    assert!(out.contains(r#""authenticated":false"#));
    Ok(())
}

#[tokio::test]
async fn logout_reports_whether_a_session_was_cleared() -> anyhow::Result<()> {
    let iam = MockIam::start(vec![(200, refresh_body())]).await?;
    let manager = manager_for(&iam, &MemoryStorage::new())?;
    manager.login(credential_expiring_in(3600));

    let out = run_command(Command::Logout, &manager).await?;
    assert_eq!(out.trim(), r#"{"logged_out":true}"#);
    let out = run_command(Command::Logout, &manager).await?;
    assert_eq!(out.trim(), r#"{"logged_out":false}"#);
    Ok(())
}

#[tokio::test]
async fn get_prints_response_body() -> anyhow::Result<()> {
    let iam = MockIam::start(vec![(200, refresh_body())]).await?;
    let manager = manager_for(&iam, &MemoryStorage::new())?;
    let cred = credential_expiring_in(3600);
    manager.login(cred.clone());

    let url = format!("{}/api/projects", iam.base_url());
    let out = run_command(Command::Get { url }, &manager).await?;
    let body: serde_json::Value = serde_json::from_str(&out)?;
    assert_eq!(body["path"], "/api/projects");
    assert_eq!(body["authorization"], format!("Bearer {}", cred.access_token));
    Ok(())
}

#[tokio::test]
async fn watch_prints_events_until_shutdown() -> anyhow::Result<()> {
    let iam = MockIam::start(vec![(200, refresh_body())]).await?;
    let manager = manager_for(&iam, &MemoryStorage::new())?;
    manager.login(credential_expiring_in(3600));

    let shutdown = CancellationToken::new();
    let mut out = Vec::new();
    let stop = async {
        let _ = iam.wait_for_refresh_calls(1, WAIT).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.cancel();
    };
    let (result, _) =
        tokio::join!(execute(&Command::Watch, &manager, &mut out, shutdown.clone()), stop);
    result?;

    let out = String::from_utf8(out)?;
    assert!(out.lines().any(|line| line == r#"{"event":"token_refreshed"}"#), "got: {out}");
    Ok(())
}
