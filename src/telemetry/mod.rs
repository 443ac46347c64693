// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry, tracing, and metrics infrastructure.
//!
//! - **Tracing**: structured logging with spans per connection and per directive
//! - **Metrics**: run outcomes, directive latencies, chunk and token counters
//! - **Correlation IDs**: one per client connection, doubling as its session id
//!
//! # Usage
//!
//! ```rust,ignore
//! use agent_relay::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```
//!
//! Metrics recording is compiled in with the `telemetry` feature (on by default).

mod correlation;
mod init;
pub mod metrics;
mod spans;

pub use correlation::CorrelationId;
pub use init::{init_telemetry, LogFormat, TelemetryConfig, TelemetryGuard};
pub use metrics::{LatencyStats, Metrics, MetricsSnapshot, GLOBAL_METRICS};
pub use spans::DirectiveSpan;
