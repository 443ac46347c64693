// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber setup.

use std::io;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output layout for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One line per event.
    Compact,
    /// Multi-line, with span context and source locations.
    Full,
}

/// How the relay logs to stderr.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Used when neither `filter_directive` nor `RUST_LOG` is set.
    pub default_level: Level,
    /// Log connection and directive spans as they close, with their timings.
    pub span_close_events: bool,
    pub ansi_colors: bool,
    pub format: LogFormat,
    pub filter_directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            span_close_events: false,
            ansi_colors: true,
            format: LogFormat::Compact,
            filter_directive: None,
        }
    }
}

impl TelemetryConfig {
    /// `--trace` implies `--debug` and additionally logs every liveness verdict.
    pub fn from_verbosity(debug: bool, trace: bool) -> Self {
        let (level, filter) = match (debug, trace) {
            (_, true) => (Level::TRACE, "agent_relay=trace,axum=debug"),
            (true, false) => (Level::DEBUG, "agent_relay=debug"),
            (false, false) => return Self::default(),
        };
        Self {
            default_level: level,
            span_close_events: true,
            format: LogFormat::Full,
            ..Self::default()
        }
        .with_filter(filter)
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    /// An explicit directive wins, then `RUST_LOG`, then the default level.
    fn env_filter(&self) -> EnvFilter {
        let explicit = self
            .filter_directive
            .as_deref()
            .and_then(|directive| EnvFilter::try_new(directive).ok());
        explicit
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(self.default_level.to_string()))
    }
}

/// Held by `main` for the life of the process; logs the metrics report at
/// debug level when dropped.
pub struct TelemetryGuard {
    _private: (),
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "telemetry")]
        tracing::debug!(
            "{}",
            super::metrics::GLOBAL_METRICS.snapshot().format_report()
        );
    }
}

/// Install the global subscriber writing to stderr, leaving stdout to command
/// output. Errors if a subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let span_events = match config.span_close_events {
        true => FmtSpan::CLOSE,
        false => FmtSpan::NONE,
    };
    let verbose = config.format == LogFormat::Full;

    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi_colors)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_span_events(span_events);

    let subscriber = tracing_subscriber::registry().with(config.env_filter());
    let installed = match config.format {
        LogFormat::Compact => subscriber.with(layer.compact()).try_init(),
        LogFormat::Full => subscriber.with(layer).try_init(),
    };
    installed.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}
