// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Session lifecycle notifications, broadcast to any interested subscriber.
///
/// `RefreshFailed` is the application-level signal that the session was lost
/// and data should be re-fetched as a logged-out user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn,
    TokenRefreshed,
    LoggedOut,
    #[serde(rename = "refresh:failed")]
    RefreshFailed { error: String },
}
