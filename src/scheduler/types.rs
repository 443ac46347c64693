// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scheduler type definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of an agent's step sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    /// Perform one generation turn.
    RunStep,
    /// Perform generation turns until the model ends its turn or the step budget runs out.
    RunStepsToEnd,
    /// Run another agent under this run's lineage and wait for it to finish.
    SpawnChild {
        agent_type: String,
        #[serde(default)]
        params: serde_json::Value,
    },
}

impl Directive {
    /// Create a spawn directive.
    pub fn spawn(agent_type: impl Into<String>, params: serde_json::Value) -> Self {
        Self::SpawnChild {
            agent_type: agent_type.into(),
            params,
        }
    }

    /// Short name used in spans and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStep => "run_step",
            Self::RunStepsToEnd => "run_steps_to_end",
            Self::SpawnChild { .. } => "spawn_child",
        }
    }
}

/// How a generation turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEnd {
    /// The model wants another turn.
    Continue,
    /// The model is done.
    EndTurn,
}

/// What the previous directive produced, handed to the program when it resumes.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveOutcome {
    /// A generation turn (or run of turns) finished.
    Step { end: TurnEnd, text: String },
    /// A spawned child reached a terminal state.
    Child(Box<RunOutcome>),
}

/// Lifecycle of one agent run.
///
/// `Ready -> Running <-> AwaitingChild -> Completed | Cancelled | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Ready,
    Running,
    AwaitingChild,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Ready, Running)
                | (Ready, Cancelled)
                | (Ready, Failed)
                | (Running, AwaitingChild)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Failed)
                | (AwaitingChild, Running)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::AwaitingChild => "awaiting_child",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage reported by the model collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Everything needed to start (or spawn) one agent run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// User the top-level request is attributed to.
    pub user_id: Option<String>,
    /// Transport session the request arrived on.
    pub session_id: Option<String>,
    /// Request id; children extend their parent's id.
    pub request_id: String,
    pub agent_type: String,
    pub prompt: String,
    pub params: serde_json::Value,
    /// Generation turns this agent may still take.
    pub steps_remaining: u32,
}

impl RunRequest {
    pub fn new(
        request_id: impl Into<String>,
        agent_type: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            user_id: None,
            session_id: None,
            request_id: request_id.into(),
            agent_type: agent_type.into(),
            prompt: prompt.into(),
            params: serde_json::Value::Null,
            steps_remaining: super::DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps_remaining = steps;
        self
    }

    /// Derive the request for a child agent.
    ///
    /// The child id starts with this request's id, which is what makes
    /// cancelling an ancestor cancel the child.
    pub fn child(&self, agent_type: &str, params: serde_json::Value, steps: u32) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            request_id: format!("{}-{}-{}", self.request_id, agent_type, &suffix[..8]),
            agent_type: agent_type.to_string(),
            prompt: self.prompt.clone(),
            params,
            steps_remaining: steps,
        }
    }
}

/// Terminal result of one agent run, children included.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub request_id: String,
    pub agent_type: String,
    pub state: RunState,
    /// Text this agent produced (children's text is in `children`).
    pub output: String,
    /// Usage for this agent and all of its descendants.
    pub usage: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps_used: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RunOutcome>,
}

impl RunOutcome {
    /// Outcome for a run that failed before executing anything.
    pub fn rejected(request: &RunRequest, error: impl Into<String>) -> Self {
        Self {
            request_id: request.request_id.clone(),
            agent_type: request.agent_type.clone(),
            state: RunState::Failed,
            output: String::new(),
            usage: TokenUsage::default(),
            error: Some(error.into()),
            steps_used: 0,
            children: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == RunState::Cancelled
    }

    pub fn is_failed(&self) -> bool {
        self.state == RunState::Failed
    }
}

/// Events streamed out of a run while it executes, in production order.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Chunk {
        request_id: String,
        agent_type: String,
        text: String,
    },
    Error {
        request_id: String,
        agent_type: String,
        message: String,
    },
    Usage {
        request_id: String,
        usage: TokenUsage,
    },
    StateChanged {
        request_id: String,
        state: RunState,
    },
}
