// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent Relay - streaming orchestration for cancellable agent runs.
//!
//! Clients submit prompts over a streaming protocol; each prompt runs as a
//! tree of agents, where an agent may spawn children whose request ids extend
//! its own. Whether any run may continue is decided by one question, asked
//! before every directive and between streamed chunks: is this request id, or
//! an ancestor it extends, still live for its user, and is the client session
//! still connected?
//!
//! # Architecture
//!
//! - [`registry`] - live top-level request ids per user, connected sessions
//! - [`runtime`] - [`RuntimeContext`] owning both registries and the check overrides
//! - [`oracle`] - the liveness decision with prefix cascade
//! - [`scheduler`] - directive state machine, agent catalog, model collaborator trait
//! - [`gateway`] - wire protocol, client sessions, WebSocket and NDJSON transports
//! - [`invoker`] - built-in model collaborators
//! - [`config`] - layered configuration
//! - [`telemetry`] - tracing setup, metrics, correlation ids
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use agent_relay::{RuntimeContext, scheduler::{AgentCatalog, RunRequest, StepScheduler}};
//! use agent_relay::invoker::EchoInvoker;
//!
//! let ctx = Arc::new(RuntimeContext::embedded());
//! let scheduler = StepScheduler::new(ctx, Arc::new(AgentCatalog::with_builtins()), Arc::new(EchoInvoker::new()));
//! let (tx, _rx) = tokio::sync::mpsc::channel(64);
//! let outcome = scheduler.run(RunRequest::new("r1", "base", "hello"), tx).await;
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod invoker;
pub mod oracle;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod server;
pub mod telemetry;

pub use error::{ConfigError, GenerationError, ProtocolError, Result, TransportError};
pub use oracle::LivenessVerdict;
pub use registry::{LiveInputRegistry, SessionConnectionRegistry};
pub use runtime::{LivenessChecks, RuntimeContext};
pub use scheduler::{RunOutcome, RunRequest, RunState, StepScheduler};
pub use server::RelayServer;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
