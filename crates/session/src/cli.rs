// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line front end for driving a session by hand.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::credential::persist::FileStorage;
use crate::credential::{access_token_expiry, Credential};
use crate::session::AuthSessionManager;

#[derive(Debug, Parser)]
#[command(name = "caffeine-session", version, about = "Caffeine authenticated session tool.")]
pub struct Cli {
    #[command(flatten)]
    pub session: SessionConfig,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "CAFFEINE_LOG_FORMAT")]
    pub log_format: String,

    /// Log level filter.
    #[arg(long, default_value = "info", env = "CAFFEINE_LOG_LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Store a credential issued by IAM (`-` reads it from stdin).
    Login {
        #[arg(value_name = "FILE")]
        credential: PathBuf,
    },
    /// Clear the stored session.
    Logout,
    /// Print the current session state as JSON.
    Status,
    /// GET a URL through the session pipeline and print the JSON body.
    Get { url: String },
    /// Keep the session fresh and print session events until interrupted.
    Watch,
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.session.validate()?;
        match self.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => anyhow::bail!("invalid --log-format: {other} (expected json or text)"),
        }
    }
}

/// Session state as printed by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub authenticated: bool,
    pub access_expires_at: Option<u64>,
    pub refresh_expires_at: Option<u64>,
    pub refreshing: bool,
    pub last_refresh_error: Option<String>,
}

impl Status {
    pub fn of(manager: &AuthSessionManager) -> Self {
        let credential = manager.credential();
        Self {
            authenticated: credential.is_some(),
            access_expires_at: credential
                .as_ref()
                .and_then(|c| access_token_expiry(&c.access_token).ok()),
            refresh_expires_at: credential.as_ref().map(|c| c.refresh_token.expires_at),
            refreshing: manager.pending_refresh().is_some(),
            last_refresh_error: manager.last_refresh_error(),
        }
    }
}

/// Open the persisted session and run one command against it.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let state_dir = cli.session.resolved_state_dir();
    info!(state_dir = %state_dir.display(), "using session state");
    let manager = AuthSessionManager::new(cli.session, Arc::new(FileStorage::new(state_dir)))?;
    manager.restore()?;

    let shutdown = CancellationToken::new();
    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, shutting down");
            }
            sd.cancel();
        });
    }

    let mut out = std::io::stdout();
    execute(&cli.command, &manager, &mut out, shutdown).await
}

/// Run a single command, writing its output to `out`.
pub async fn execute<W: Write + Send>(
    command: &Command,
    manager: &AuthSessionManager,
    out: &mut W,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Command::Login { credential } => {
            let credential = read_credential(credential)?;
            if let Err(e) = access_token_expiry(&credential.access_token) {
                warn!("access token has no readable expiry: {e}");
            }
            manager.login(credential);
            write_json(out, &Status::of(manager))?;
        }
        Command::Logout => {
            let cleared = manager.logout();
            write_json(out, &serde_json::json!({ "logged_out": cleared }))?;
        }
        Command::Status => {
            write_json(out, &Status::of(manager))?;
        }
        Command::Get { url } => {
            let body = manager.client().get_json(url).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&body)?)?;
        }
        Command::Watch => watch(manager, out, shutdown).await?,
    }
    Ok(())
}

async fn watch<W: Write + Send>(
    manager: &AuthSessionManager,
    out: &mut W,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut events = manager.subscribe();
    manager.spawn_refresh_loop(shutdown.clone());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    write_json(out, &event)?;
                    out.flush()?;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("watch lagged, skipped {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn read_credential(path: &Path) -> anyhow::Result<Credential> {
    let contents = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&contents)?)
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> anyhow::Result<()> {
    writeln!(out, "{}", serde_json::to_string(value)?)?;
    Ok(())
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
