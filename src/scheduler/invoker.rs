// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The model-invocation collaborator.
//!
//! A generation turn is a pull-based stream: the scheduler asks for the next
//! event only when it still wants one, so it can stop a turn between chunks
//! by dropping the stream. Nothing is ever force-killed.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use super::types::{TokenUsage, TurnEnd};
use crate::error::GenerationError;

/// Events a turn yields.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Streamed output text.
    Text(String),
    /// Token usage for the turn so far.
    Usage(TokenUsage),
    /// The turn is over. A stream that ends without this counts as `EndTurn`.
    End(TurnEnd),
}

/// Stream of events for one generation turn.
pub type TurnStream = BoxStream<'static, Result<TurnEvent, GenerationError>>;

/// Context passed to the collaborator for one turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub request_id: String,
    pub agent_type: String,
    pub prompt: String,
    pub params: serde_json::Value,
    /// Zero-based index of this turn within the agent's run.
    pub step_index: u32,
    /// Text the agent produced in earlier turns of this run.
    pub transcript: String,
}

/// Runs one generation turn against a model.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Start a turn. Failing here fails the directive; so does an `Err` item in the stream.
    async fn start_turn(&self, request: TurnRequest) -> Result<TurnStream, GenerationError>;

    /// Collaborator name for logs.
    fn name(&self) -> &str;
}
