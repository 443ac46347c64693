// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared runtime context.
//!
//! One [`RuntimeContext`] per server (or per embedding) owns the liveness
//! registries and the operational overrides. The gateway and the scheduler
//! receive it as an `Arc`, which keeps tests isolated from each other and lets
//! several independent runtimes live in one process.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::oracle::{self, LivenessVerdict};
use crate::registry::{LiveInputRegistry, SessionConnectionRegistry};

/// Process-wide escape hatches for liveness checking.
///
/// Both default to enabled. Disabling live-input checks makes every request
/// live (useful when embedding without populating the registries); disabling
/// session checks ignores transport connectivity only.
#[derive(Debug)]
pub struct LivenessChecks {
    live_inputs: AtomicBool,
    sessions: AtomicBool,
}

impl Default for LivenessChecks {
    fn default() -> Self {
        Self {
            live_inputs: AtomicBool::new(true),
            sessions: AtomicBool::new(true),
        }
    }
}

impl LivenessChecks {
    pub fn live_input_checks_enabled(&self) -> bool {
        self.live_inputs.load(Ordering::Acquire)
    }

    pub fn session_checks_enabled(&self) -> bool {
        self.sessions.load(Ordering::Acquire)
    }

    pub fn set_live_input_checks(&self, enabled: bool) {
        self.live_inputs.store(enabled, Ordering::Release);
    }

    pub fn set_session_checks(&self, enabled: bool) {
        self.sessions.store(enabled, Ordering::Release);
    }
}

/// Registries plus overrides, shared by every connection and run.
#[derive(Debug, Default)]
pub struct RuntimeContext {
    pub live_inputs: LiveInputRegistry,
    pub sessions: SessionConnectionRegistry,
    pub checks: LivenessChecks,
}

impl RuntimeContext {
    /// Context for a server deployment: both checks enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for embedding without a gateway: live-input checking disabled.
    pub fn embedded() -> Self {
        let ctx = Self::default();
        ctx.checks.set_live_input_checks(false);
        ctx
    }

    /// Builder-style override toggles.
    pub fn with_checks(self, live_inputs: bool, sessions: bool) -> Self {
        self.checks.set_live_input_checks(live_inputs);
        self.checks.set_session_checks(sessions);
        self
    }

    /// See [`oracle::is_live`].
    pub fn is_live(
        &self,
        user_id: Option<&str>,
        request_id: &str,
        session_id: Option<&str>,
    ) -> bool {
        oracle::is_live(self, user_id, request_id, session_id)
    }

    pub fn verdict(
        &self,
        user_id: Option<&str>,
        request_id: &str,
        session_id: Option<&str>,
    ) -> LivenessVerdict {
        oracle::evaluate(self, user_id, request_id, session_id)
    }

    /// Clear both registries and re-enable both checks. Test harness use only.
    pub fn reset(&self) {
        self.live_inputs.reset();
        self.sessions.reset();
        self.checks.set_live_input_checks(true);
        self.checks.set_session_checks(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_checks() {
        let ctx = RuntimeContext::new();
        assert!(ctx.checks.live_input_checks_enabled());
        assert!(ctx.checks.session_checks_enabled());
    }

    #[test]
    fn test_embedded_disables_live_input_checks() {
        let ctx = RuntimeContext::embedded();
        assert!(!ctx.checks.live_input_checks_enabled());
        assert!(ctx.checks.session_checks_enabled());
    }

    #[test]
    fn test_reset_restores_everything() {
        let ctx = RuntimeContext::new().with_checks(false, false);
        ctx.live_inputs.start_user_input("u1", "r1");
        ctx.sessions.set_connected("s1", true);

        ctx.reset();

        assert!(ctx.live_inputs.is_empty());
        assert_eq!(ctx.sessions.connected_count(), 0);
        assert!(ctx.checks.live_input_checks_enabled());
        assert!(ctx.checks.session_checks_enabled());
    }
}
