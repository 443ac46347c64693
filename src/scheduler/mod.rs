// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cooperative step scheduler.
//!
//! Drives one agent's directive sequence, one directive in flight at a time:
//!
//! ```text
//! Ready -> Running <-> AwaitingChild -> Completed | Cancelled | Failed
//! ```
//!
//! Before every directive, and again each time a generation turn yields a
//! chunk, the scheduler asks the cancellation oracle whether the run's request
//! id is still live. When it is not, the run stops pulling work and ends
//! `Cancelled`. Cancellation is a state, never an error.
//!
//! `SpawnChild` recursively runs another agent whose request id extends the
//! parent's, suspending the parent until the child is terminal. A child's
//! failure ends only the child; the parent's program sees the child outcome
//! and decides.

mod definition;
mod invoker;
mod types;

pub use definition::{
    builtin_agents, AgentCatalog, AgentDefinition, AgentSpec, Next, ScriptedProgram, StepProgram,
    StepSpec, CONTEXT_PRUNER,
};
pub use invoker::{ModelInvoker, TurnEvent, TurnRequest, TurnStream};
pub use types::{
    Directive, DirectiveOutcome, RunEvent, RunOutcome, RunRequest, RunState, TokenUsage, TurnEnd,
};

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use crate::error::GenerationError;
use crate::runtime::RuntimeContext;
use crate::telemetry::DirectiveSpan;

/// Generation turns an agent may take when nothing else says otherwise.
pub const DEFAULT_MAX_STEPS: u32 = 10;

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Step budget handed to each spawned child.
    pub child_max_steps: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            child_max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl SchedulerConfig {
    pub fn with_child_max_steps(mut self, steps: u32) -> Self {
        self.child_max_steps = steps;
        self
    }
}

/// How one generation turn ended, from the scheduler's point of view.
enum TurnResult {
    Ended(TurnEnd, String),
    Cancelled,
    Failed(GenerationError),
    BudgetExhausted,
}

/// Mutable bookkeeping for one agent run.
struct AgentRun {
    request: RunRequest,
    state: RunState,
    output: String,
    usage: TokenUsage,
    error: Option<String>,
    steps_used: u32,
    children: Vec<RunOutcome>,
    events: mpsc::Sender<RunEvent>,
}

impl AgentRun {
    fn new(request: RunRequest, events: mpsc::Sender<RunEvent>) -> Self {
        Self {
            request,
            state: RunState::Ready,
            output: String::new(),
            usage: TokenUsage::default(),
            error: None,
            steps_used: 0,
            children: Vec::new(),
            events,
        }
    }

    async fn emit(&self, event: RunEvent) {
        // The receiver going away (client gone) must not stop the run;
        // the oracle decides that.
        let _ = self.events.send(event).await;
    }

    async fn transition(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            warn!(
                request_id = %self.request.request_id,
                from = %self.state,
                to = %next,
                "Ignoring invalid run state transition"
            );
            return;
        }
        debug!(request_id = %self.request.request_id, from = %self.state, to = %next, "Run state");
        self.state = next;
        self.emit(RunEvent::StateChanged {
            request_id: self.request.request_id.clone(),
            state: next,
        })
        .await;
    }

    async fn fail(&mut self, message: String) {
        self.emit(RunEvent::Error {
            request_id: self.request.request_id.clone(),
            agent_type: self.request.agent_type.clone(),
            message: message.clone(),
        })
        .await;
        self.error = Some(message);
        self.transition(RunState::Failed).await;
    }

    fn into_outcome(self) -> RunOutcome {
        RunOutcome {
            request_id: self.request.request_id,
            agent_type: self.request.agent_type,
            state: self.state,
            output: self.output,
            usage: self.usage,
            error: self.error,
            steps_used: self.steps_used,
            children: self.children,
        }
    }
}

/// Runs agents from a catalog against a model collaborator.
#[derive(Clone)]
pub struct StepScheduler {
    ctx: Arc<RuntimeContext>,
    catalog: Arc<AgentCatalog>,
    invoker: Arc<dyn ModelInvoker>,
    config: SchedulerConfig,
}

impl StepScheduler {
    pub fn new(
        ctx: Arc<RuntimeContext>,
        catalog: Arc<AgentCatalog>,
        invoker: Arc<dyn ModelInvoker>,
    ) -> Self {
        Self {
            ctx,
            catalog,
            invoker,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    /// Run `request` to a terminal state, streaming events into `events`.
    ///
    /// Always returns an outcome; failures and cancellation are states on it.
    pub async fn run(&self, request: RunRequest, events: mpsc::Sender<RunEvent>) -> RunOutcome {
        let span = tracing::info_span!(
            "run",
            request_id = %request.request_id,
            agent = %request.agent_type,
        );
        let outcome = self.run_agent(request, events).instrument(span).await;

        info!(
            request_id = %outcome.request_id,
            state = %outcome.state,
            steps = outcome.steps_used,
            tokens = outcome.usage.total(),
            "Run finished"
        );
        outcome
    }

    fn is_live(&self, request: &RunRequest) -> bool {
        self.ctx.is_live(
            request.user_id.as_deref(),
            &request.request_id,
            request.session_id.as_deref(),
        )
    }

    // Boxed so a run can await its own children.
    fn run_agent(
        &self,
        request: RunRequest,
        events: mpsc::Sender<RunEvent>,
    ) -> BoxFuture<'_, RunOutcome> {
        async move {
            let mut run = AgentRun::new(request, events);

            let Some(definition) = self.catalog.get(&run.request.agent_type) else {
                let err = GenerationError::UnknownAgent(run.request.agent_type.clone());
                run.fail(err.to_string()).await;
                return self.finish(run);
            };

            run.transition(RunState::Running).await;
            let mut program = definition.program(&run.request.params);
            let mut last: Option<DirectiveOutcome> = None;

            loop {
                let directive = match program.next(last.as_ref()) {
                    Next::Run(directive) => directive,
                    Next::Done => {
                        run.transition(RunState::Completed).await;
                        break;
                    }
                    Next::Fail(message) => {
                        run.fail(message).await;
                        break;
                    }
                };

                if !self.is_live(&run.request) {
                    debug!(request_id = %run.request.request_id, directive = directive.name(), "Run no longer live");
                    run.transition(RunState::Cancelled).await;
                    break;
                }

                match directive {
                    Directive::RunStep => match self.run_turn(&mut run).await {
                        TurnResult::Ended(end, text) => {
                            last = Some(DirectiveOutcome::Step { end, text });
                        }
                        TurnResult::BudgetExhausted => {
                            run.transition(RunState::Completed).await;
                            break;
                        }
                        TurnResult::Cancelled => {
                            run.transition(RunState::Cancelled).await;
                            break;
                        }
                        TurnResult::Failed(err) => {
                            run.fail(err.to_string()).await;
                            break;
                        }
                    },
                    Directive::RunStepsToEnd => match self.run_turns_to_end(&mut run).await {
                        TurnResult::Ended(end, text) => {
                            last = Some(DirectiveOutcome::Step { end, text });
                        }
                        TurnResult::BudgetExhausted => {
                            run.transition(RunState::Completed).await;
                            break;
                        }
                        TurnResult::Cancelled => {
                            run.transition(RunState::Cancelled).await;
                            break;
                        }
                        TurnResult::Failed(err) => {
                            run.fail(err.to_string()).await;
                            break;
                        }
                    },
                    Directive::SpawnChild { agent_type, params } => {
                        let child = self.spawn_child(&mut run, definition.as_ref(), &agent_type, params).await;
                        last = Some(DirectiveOutcome::Child(Box::new(child)));
                    }
                }
            }

            self.finish(run)
        }
        .boxed()
    }

    fn finish(&self, run: AgentRun) -> RunOutcome {
        #[cfg(feature = "telemetry")]
        crate::telemetry::GLOBAL_METRICS.record_run(run.state);
        run.into_outcome()
    }

    async fn spawn_child(
        &self,
        run: &mut AgentRun,
        parent: &dyn AgentDefinition,
        agent_type: &str,
        params: serde_json::Value,
    ) -> RunOutcome {
        let child_request = run
            .request
            .child(agent_type, params, self.config.child_max_steps);

        if !parent.can_spawn(agent_type) {
            let err = GenerationError::NotSpawnable {
                parent: parent.id().to_string(),
                child: agent_type.to_string(),
            };
            warn!(request_id = %run.request.request_id, child = agent_type, "Refusing spawn");
            let outcome = RunOutcome::rejected(&child_request, err.to_string());
            run.children.push(outcome.clone());
            return outcome;
        }

        let span = DirectiveSpan::start("spawn_child", &run.request.agent_type, &run.request.request_id);
        run.transition(RunState::AwaitingChild).await;

        debug!(parent = %run.request.request_id, child = %child_request.request_id, "Spawning child");
        let child = self
            .run_agent(child_request, run.events.clone())
            .instrument(span.span().clone())
            .await;

        run.usage.add(&child.usage);
        run.transition(RunState::Running).await;
        span.finish(!child.is_failed());

        run.children.push(child.clone());
        child
    }

    /// One generation turn, pulling chunks until the turn ends or the run stops being live.
    async fn run_turn(&self, run: &mut AgentRun) -> TurnResult {
        if run.request.steps_remaining == 0 {
            warn!(request_id = %run.request.request_id, "Step budget exhausted");
            return TurnResult::BudgetExhausted;
        }
        run.request.steps_remaining -= 1;
        let step_index = run.steps_used;
        run.steps_used += 1;

        let span = DirectiveSpan::start("run_step", &run.request.agent_type, &run.request.request_id);
        let turn = TurnRequest {
            request_id: run.request.request_id.clone(),
            agent_type: run.request.agent_type.clone(),
            prompt: run.request.prompt.clone(),
            params: run.request.params.clone(),
            step_index,
            transcript: run.output.clone(),
        };

        let mut stream = match self
            .invoker
            .start_turn(turn)
            .instrument(span.span().clone())
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                span.finish(false);
                return TurnResult::Failed(err);
            }
        };

        let mut text = String::new();
        let mut end = TurnEnd::EndTurn;

        while let Some(item) = stream.next().await {
            if !self.is_live(&run.request) {
                // Dropping the stream is how a pull-based turn is stopped.
                drop(stream);
                span.finish(false);
                return TurnResult::Cancelled;
            }

            match item {
                Ok(TurnEvent::Text(chunk)) => {
                    #[cfg(feature = "telemetry")]
                    crate::telemetry::GLOBAL_METRICS.record_chunk();
                    text.push_str(&chunk);
                    run.output.push_str(&chunk);
                    run.emit(RunEvent::Chunk {
                        request_id: run.request.request_id.clone(),
                        agent_type: run.request.agent_type.clone(),
                        text: chunk,
                    })
                    .await;
                }
                Ok(TurnEvent::Usage(usage)) => {
                    #[cfg(feature = "telemetry")]
                    crate::telemetry::GLOBAL_METRICS.record_tokens(usage.input_tokens, usage.output_tokens);
                    run.usage.add(&usage);
                    run.emit(RunEvent::Usage {
                        request_id: run.request.request_id.clone(),
                        usage,
                    })
                    .await;
                }
                Ok(TurnEvent::End(turn_end)) => {
                    end = turn_end;
                    break;
                }
                Err(err) => {
                    span.finish(false);
                    return TurnResult::Failed(err);
                }
            }
        }

        span.finish(true);
        TurnResult::Ended(end, text)
    }

    /// Turns until the model ends its turn, re-checking liveness before each one.
    async fn run_turns_to_end(&self, run: &mut AgentRun) -> TurnResult {
        let mut text = String::new();
        loop {
            if !self.is_live(&run.request) {
                return TurnResult::Cancelled;
            }
            match self.run_turn(run).await {
                TurnResult::Ended(TurnEnd::Continue, turn_text) => text.push_str(&turn_text),
                TurnResult::Ended(TurnEnd::EndTurn, turn_text) => {
                    text.push_str(&turn_text);
                    return TurnResult::Ended(TurnEnd::EndTurn, text);
                }
                other => return other,
            }
        }
    }
}
