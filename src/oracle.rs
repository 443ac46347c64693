// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The cancellation oracle.
//!
//! A single predicate every step consults before doing more work: may this
//! request still run? The answer combines the override toggles, the session
//! registry and the live-input registry, short-circuiting in that order.

use std::fmt;

use tracing::trace;

use crate::runtime::RuntimeContext;

/// Why a request is, or is not, live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessVerdict {
    /// Live-input checking is switched off; everything runs.
    ChecksDisabled,
    /// A live id for the user prefixes the request id.
    Live,
    /// No user could be attributed to the request.
    NoUser,
    /// Session checking is on and the session is not connected.
    SessionDisconnected,
    /// The user has no live inputs at all.
    NoLiveInputs,
    /// The user has live inputs, none of which prefixes the request id.
    NoPrefixMatch,
}

impl LivenessVerdict {
    pub fn is_live(self) -> bool {
        matches!(self, Self::ChecksDisabled | Self::Live)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChecksDisabled => "checks_disabled",
            Self::Live => "live",
            Self::NoUser => "no_user",
            Self::SessionDisconnected => "session_disconnected",
            Self::NoLiveInputs => "no_live_inputs",
            Self::NoPrefixMatch => "no_prefix_match",
        }
    }
}

impl fmt::Display for LivenessVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether `request_id` may continue, and why.
pub fn evaluate(
    ctx: &RuntimeContext,
    user_id: Option<&str>,
    request_id: &str,
    session_id: Option<&str>,
) -> LivenessVerdict {
    if !ctx.checks.live_input_checks_enabled() {
        return LivenessVerdict::ChecksDisabled;
    }

    let user_id = match user_id {
        Some(id) if !id.is_empty() => id,
        _ => return LivenessVerdict::NoUser,
    };

    if ctx.checks.session_checks_enabled() {
        let connected = session_id
            .map(|id| ctx.sessions.is_connected(id))
            .unwrap_or(false);
        if !connected {
            return LivenessVerdict::SessionDisconnected;
        }
    }

    match ctx.live_inputs.has_live_prefix(user_id, request_id) {
        None => LivenessVerdict::NoLiveInputs,
        Some(true) => LivenessVerdict::Live,
        Some(false) => LivenessVerdict::NoPrefixMatch,
    }
}

/// `true` if `request_id` (or an ancestor it extends) is still live.
pub fn is_live(
    ctx: &RuntimeContext,
    user_id: Option<&str>,
    request_id: &str,
    session_id: Option<&str>,
) -> bool {
    let verdict = evaluate(ctx, user_id, request_id, session_id);
    if !verdict.is_live() {
        trace!(
            user_id = user_id.unwrap_or(""),
            request_id,
            session_id = session_id.unwrap_or(""),
            reason = %verdict,
            "Request not live"
        );
    }
    verdict.is_live()
}
