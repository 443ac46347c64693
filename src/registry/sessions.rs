// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Registry of connected transport sessions.

use dashmap::DashSet;
use tracing::debug;

/// Presence of a session id means its transport is connected.
///
/// There are no intermediate states. Disconnecting does not touch the
/// live-input registry; the oracle consults both.
#[derive(Debug, Default)]
pub struct SessionConnectionRegistry {
    sessions: DashSet<String>,
}

impl SessionConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `session_id` connected (`true`) or forget it (`false`). Idempotent.
    pub fn set_connected(&self, session_id: &str, connected: bool) {
        if connected {
            if self.sessions.insert(session_id.to_string()) {
                debug!(session_id, "Session connected");
            }
        } else if self.sessions.remove(session_id).is_some() {
            debug!(session_id, "Session disconnected");
        }
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.sessions.contains(session_id)
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.len()
    }

    /// Forget every session. Test harness use only.
    pub fn reset(&self) {
        self.sessions.clear();
    }
}
