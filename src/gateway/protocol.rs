// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire protocol for client sessions.
//!
//! JSON envelopes, one per WebSocket text frame or one per line on the
//! newline-delimited transports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::scheduler::{RunState, TokenUsage};

/// Default upper bound on one inbound frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

// ============================================================================
// Client -> Server
// ============================================================================

/// Messages sent from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Action { txid: String, data: ClientAction },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        txid: Option<String>,
    },
}

/// Payload of a client `action` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientAction {
    Prompt(PromptAction),
    #[serde(rename = "cancel-user-input", alias = "cancel")]
    CancelUserInput(CancelAction),
}

/// A prompt submission. `prompt_id` becomes the top-level request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAction {
    pub fingerprint_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub prompt_id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_mode: Option<String>,
    #[serde(default)]
    pub files: serde_json::Value,
    /// Opaque to the relay apart from the main agent's type and step budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl PromptAction {
    /// Root agent requested through `sessionState.mainAgentState.agentType`.
    pub fn main_agent_type(&self) -> Option<&str> {
        self.session_state
            .as_ref()?
            .pointer("/mainAgentState/agentType")?
            .as_str()
            .filter(|s| !s.is_empty())
    }

    /// Step budget from `sessionState.mainAgentState.stepsRemaining`.
    pub fn steps_remaining(&self) -> Option<u32> {
        self.session_state
            .as_ref()?
            .pointer("/mainAgentState/stepsRemaining")?
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub prompt_id: String,
}

// ============================================================================
// Server -> Client
// ============================================================================

/// Messages sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        txid: Option<String>,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Pong,
    Action { data: ServerAction },
}

/// Payload of a server `action` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerAction {
    AgentChunk(AgentChunk),
    UsageResponse(UsageResponse),
    PromptResponse(PromptResponse),
}

/// Streamed output from one agent, top-level or spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentChunk {
    /// Request id of the producing agent; children carry a prefixed id.
    pub user_input_id: String,
    pub agent_type: String,
    pub chunk: Chunk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Chunk {
    Text { text: String },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub prompt_id: String,
    /// Total tokens across the whole agent tree.
    pub usage: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStatus {
    Completed,
    Cancelled,
    Failed,
}

impl From<RunState> for PromptStatus {
    fn from(state: RunState) -> Self {
        match state {
            RunState::Completed => PromptStatus::Completed,
            RunState::Failed => PromptStatus::Failed,
            // Only terminal states reach the wire; anything else was cut short.
            _ => PromptStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub prompt_id: String,
    pub status: PromptStatus,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl ServerMessage {
    pub fn ack(txid: Option<String>) -> Self {
        ServerMessage::Ack {
            txid,
            success: true,
            error: None,
        }
    }

    pub fn nack(txid: Option<String>, error: impl Into<String>) -> Self {
        ServerMessage::Ack {
            txid,
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn text_chunk(user_input_id: &str, agent_type: &str, text: impl Into<String>) -> Self {
        Self::chunk(user_input_id, agent_type, Chunk::Text { text: text.into() })
    }

    pub fn error_chunk(user_input_id: &str, agent_type: &str, message: impl Into<String>) -> Self {
        Self::chunk(
            user_input_id,
            agent_type,
            Chunk::Error {
                message: message.into(),
            },
        )
    }

    fn chunk(user_input_id: &str, agent_type: &str, chunk: Chunk) -> Self {
        ServerMessage::Action {
            data: ServerAction::AgentChunk(AgentChunk {
                user_input_id: user_input_id.to_string(),
                agent_type: agent_type.to_string(),
                chunk,
            }),
        }
    }

    pub fn usage(prompt_id: &str, usage: &TokenUsage) -> Self {
        ServerMessage::Action {
            data: ServerAction::UsageResponse(UsageResponse {
                prompt_id: prompt_id.to_string(),
                usage: usage.total(),
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            }),
        }
    }

    pub fn prompt_response(
        prompt_id: &str,
        state: RunState,
        output: String,
        error: Option<String>,
    ) -> Self {
        ServerMessage::Action {
            data: ServerAction::PromptResponse(PromptResponse {
                prompt_id: prompt_id.to_string(),
                status: state.into(),
                output,
                error,
                finished_at: Utc::now(),
            }),
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, ServerMessage::Ack { .. })
    }
}

// ============================================================================
// Serialization Helpers
// ============================================================================

/// Encode a message as one newline-terminated JSON line.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string(msg)?;
    json.push('\n');
    Ok(json)
}

/// Decode one message, tolerating surrounding whitespace.
pub fn decode<'a, T: Deserialize<'a>>(json: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(json.trim())
}

/// Decode and validate one inbound frame.
pub fn decode_client_frame(frame: &str, max_bytes: usize) -> Result<ClientMessage, ProtocolError> {
    if frame.len() > max_bytes {
        return Err(ProtocolError::FrameTooLarge {
            size: frame.len(),
            limit: max_bytes,
        });
    }
    let msg: ClientMessage = decode(frame)?;
    validate(&msg)?;
    Ok(msg)
}

fn validate(msg: &ClientMessage) -> Result<(), ProtocolError> {
    if let ClientMessage::Action { data, .. } = msg {
        let prompt_id = match data {
            ClientAction::Prompt(p) => &p.prompt_id,
            ClientAction::CancelUserInput(c) => &c.prompt_id,
        };
        if prompt_id.trim().is_empty() {
            return Err(ProtocolError::MissingField("promptId"));
        }
    }
    Ok(())
}

/// Best-effort `txid` from a frame that failed to decode, so the failing ack
/// can still be correlated. Frames over `max_bytes` are not parsed.
pub fn peek_txid(frame: &str, max_bytes: usize) -> Option<String> {
    if frame.len() > max_bytes {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(frame.trim()).ok()?;
    value.get("txid")?.as_str().map(str::to_string)
}
