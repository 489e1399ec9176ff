// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background safety-net refresh, independent of token expiry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::coordinator::RefreshCoordinator;

/// Spawn the periodic refresh task.
///
/// Fires immediately, then every `interval`, until `shutdown` is cancelled.
/// Each tick triggers a refresh when a session exists; failures do not stop
/// the loop, so a later login is covered again.
pub fn spawn_refresh_loop(
    coordinator: Arc<RefreshCoordinator>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "refresh loop started");
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            match coordinator.trigger_refresh() {
                Some(handle) => debug!(refresh = handle.id(), "periodic refresh triggered"),
                None => debug!("no session, skipping periodic refresh"),
            }
        }
        info!("refresh loop stopped");
    })
}
