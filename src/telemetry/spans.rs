// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::time::Instant;

use tracing::{field, info_span, Span};

/// Times one scheduler directive inside a `directive` span.
///
/// A guard dropped without [`finish`](Self::finish), as happens when a run is
/// cancelled mid-directive, counts as a failure.
pub struct DirectiveSpan {
    directive: &'static str,
    span: Span,
    started: Option<Instant>,
}

impl DirectiveSpan {
    pub fn start(directive: &'static str, agent_type: &str, request_id: &str) -> Self {
        Self {
            directive,
            span: info_span!(
                "directive",
                directive,
                agent = %agent_type,
                request_id = %request_id,
                duration_ms = field::Empty,
                success = field::Empty,
            ),
            started: Some(Instant::now()),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn finish(mut self, success: bool) {
        self.close(success);
    }

    fn close(&mut self, success: bool) {
        let Some(started) = self.started.take() else {
            return;
        };
        let elapsed = started.elapsed();
        self.span.record("duration_ms", elapsed.as_secs_f64() * 1000.0);
        self.span.record("success", success);

        #[cfg(feature = "telemetry")]
        super::metrics::GLOBAL_METRICS.record_directive(self.directive, elapsed, success);
        #[cfg(not(feature = "telemetry"))]
        let _ = self.directive;
    }
}

impl Drop for DirectiveSpan {
    fn drop(&mut self) {
        self.close(false);
    }
}
