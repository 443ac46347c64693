// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent definitions and their step programs.
//!
//! The scheduler treats an agent as an opaque record: an id, the agent types
//! it may spawn, and a resumable [`StepProgram`] yielding directives. Prompts,
//! models and tools are not its concern.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::{Directive, DirectiveOutcome};

/// What a program wants next.
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    Run(Directive),
    Done,
    /// End the run as failed with this message.
    Fail(String),
}

/// A resumable directive sequence.
///
/// The scheduler calls `next` once per directive, passing the outcome of the
/// previous one, so a program can branch on turn ends and child results.
pub trait StepProgram: Send {
    fn next(&mut self, last: Option<&DirectiveOutcome>) -> Next;
}

/// A fixed list of directives.
pub struct ScriptedProgram {
    steps: VecDeque<Directive>,
    fail_on_child_failure: bool,
}

impl ScriptedProgram {
    pub fn new(steps: impl IntoIterator<Item = Directive>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            fail_on_child_failure: false,
        }
    }

    /// End the parent as failed when a spawned child fails.
    pub fn fail_on_child_failure(mut self, enabled: bool) -> Self {
        self.fail_on_child_failure = enabled;
        self
    }
}

impl StepProgram for ScriptedProgram {
    fn next(&mut self, last: Option<&DirectiveOutcome>) -> Next {
        if self.fail_on_child_failure {
            if let Some(DirectiveOutcome::Child(child)) = last {
                if child.is_failed() {
                    return Next::Fail(format!(
                        "child {} failed: {}",
                        child.agent_type,
                        child.error.as_deref().unwrap_or("unknown error")
                    ));
                }
            }
        }

        match self.steps.pop_front() {
            Some(directive) => Next::Run(directive),
            None => Next::Done,
        }
    }
}

/// An agent the scheduler can run.
pub trait AgentDefinition: Send + Sync {
    fn id(&self) -> &str;

    /// Agent types this agent may spawn.
    fn spawnable_agents(&self) -> &[String];

    fn can_spawn(&self, agent_type: &str) -> bool {
        self.spawnable_agents().iter().any(|a| a == agent_type)
    }

    /// Build a fresh program for one run.
    fn program(&self, params: &serde_json::Value) -> Box<dyn StepProgram>;
}

/// One declarative step in an [`AgentSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSpec {
    /// One generation turn.
    Step,
    /// Generation turns until the model ends its turn.
    StepAll,
    /// Spawn a child and wait for it. Null params inherit the parent's.
    Spawn {
        #[serde(rename = "agentType")]
        agent_type: String,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        params: serde_json::Value,
    },
}

/// Serde-loadable agent definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub spawnable_agents: Vec<String>,

    /// Explicit step sequence. Without one the agent runs until it ends its turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepSpec>>,

    #[serde(default)]
    pub fail_on_child_failure: bool,
}

impl AgentSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            spawnable_agents: Vec::new(),
            steps: None,
            fail_on_child_failure: false,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_spawnable(mut self, agents: &[&str]) -> Self {
        self.spawnable_agents = agents.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_steps(mut self, steps: Vec<StepSpec>) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_fail_on_child_failure(mut self, enabled: bool) -> Self {
        self.fail_on_child_failure = enabled;
        self
    }

    fn directives(&self, params: &serde_json::Value) -> Vec<Directive> {
        let Some(steps) = &self.steps else {
            return vec![Directive::RunStepsToEnd];
        };
        steps
            .iter()
            .map(|step| match step {
                StepSpec::Step => Directive::RunStep,
                StepSpec::StepAll => Directive::RunStepsToEnd,
                StepSpec::Spawn { agent_type, params: own } => {
                    let params = if own.is_null() { params.clone() } else { own.clone() };
                    Directive::spawn(agent_type.clone(), params)
                }
            })
            .collect()
    }
}

impl AgentDefinition for AgentSpec {
    fn id(&self) -> &str {
        &self.id
    }

    fn spawnable_agents(&self) -> &[String] {
        &self.spawnable_agents
    }

    fn program(&self, params: &serde_json::Value) -> Box<dyn StepProgram> {
        Box::new(
            ScriptedProgram::new(self.directives(params))
                .fail_on_child_failure(self.fail_on_child_failure),
        )
    }
}

/// Agent id of the context-compaction helper.
pub const CONTEXT_PRUNER: &str = "context-pruner";

/// Agents every catalog starts with.
pub fn builtin_agents() -> Vec<AgentSpec> {
    vec![
        AgentSpec::new("base")
            .with_display_name("Base")
            .with_spawnable(&[CONTEXT_PRUNER, "file-explorer", "researcher"]),
        AgentSpec::new("base-single-step")
            .with_display_name("Base Single Step")
            .with_spawnable(&[CONTEXT_PRUNER])
            .with_steps(vec![
                StepSpec::Spawn {
                    agent_type: CONTEXT_PRUNER.to_string(),
                    params: serde_json::Value::Null,
                },
                StepSpec::Step,
            ]),
        AgentSpec::new(CONTEXT_PRUNER)
            .with_display_name("Context Pruner")
            .with_steps(vec![StepSpec::Step]),
        AgentSpec::new("file-explorer")
            .with_display_name("File Explorer")
            .with_steps(vec![StepSpec::Step]),
        AgentSpec::new("researcher")
            .with_display_name("Researcher")
            .with_spawnable(&["file-explorer"]),
    ]
}

/// Registry of runnable agents by id.
#[derive(Clone, Default)]
pub struct AgentCatalog {
    agents: HashMap<String, Arc<dyn AgentDefinition>>,
}

impl AgentCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the built-in agents.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        for spec in builtin_agents() {
            catalog.register_spec(spec);
        }
        catalog
    }

    /// Add or replace a definition.
    pub fn register(&mut self, definition: Arc<dyn AgentDefinition>) {
        self.agents.insert(definition.id().to_string(), definition);
    }

    pub fn register_spec(&mut self, spec: AgentSpec) {
        self.register(Arc::new(spec));
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AgentDefinition>> {
        self.agents.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Agent ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for AgentCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCatalog").field("agents", &self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::{RunOutcome, RunRequest, TurnEnd};

    fn drain(program: &mut dyn StepProgram) -> Vec<Directive> {
        let mut out = Vec::new();
        while let Next::Run(d) = program.next(None) {
            out.push(d);
        }
        out
    }

    #[test]
    fn test_spec_without_steps_runs_to_end() {
        let spec = AgentSpec::new("base");
        let mut program = spec.program(&serde_json::Value::Null);
        assert_eq!(drain(program.as_mut()), vec![Directive::RunStepsToEnd]);
    }

    #[test]
    fn test_spawn_inherits_parent_params() {
        let catalog = AgentCatalog::with_builtins();
        let agent = catalog.get("base-single-step").unwrap();
        let params = serde_json::json!({"focus": "src"});
        let mut program = agent.program(&params);

        assert_eq!(
            drain(program.as_mut()),
            vec![Directive::spawn(CONTEXT_PRUNER, params), Directive::RunStep]
        );
    }

    #[test]
    fn test_scripted_program_continues_after_child_failure() {
        let mut program = ScriptedProgram::new(vec![Directive::RunStep]);
        let failed = RunOutcome::rejected(&RunRequest::new("r1-x", "x", ""), "boom");
        let last = DirectiveOutcome::Child(Box::new(failed));
        assert_eq!(program.next(Some(&last)), Next::Run(Directive::RunStep));
    }

    #[test]
    fn test_scripted_program_fails_on_child_failure() {
        let mut program =
            ScriptedProgram::new(vec![Directive::RunStep]).fail_on_child_failure(true);
        let failed = RunOutcome::rejected(&RunRequest::new("r1-x", "x", ""), "boom");
        let last = DirectiveOutcome::Child(Box::new(failed));

        match program.next(Some(&last)) {
            Next::Fail(msg) => assert!(msg.contains("boom")),
            other => panic!("expected Fail, got {:?}", other),
        }

        let step = DirectiveOutcome::Step {
            end: TurnEnd::EndTurn,
            text: String::new(),
        };
        let mut program =
            ScriptedProgram::new(vec![Directive::RunStep]).fail_on_child_failure(true);
        assert_eq!(program.next(Some(&step)), Next::Run(Directive::RunStep));
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = AgentCatalog::with_builtins();
        assert!(catalog.contains("base"));
        assert!(catalog.contains(CONTEXT_PRUNER));
        assert!(catalog.get("base").unwrap().can_spawn(CONTEXT_PRUNER));
        assert!(!catalog.get(CONTEXT_PRUNER).unwrap().can_spawn("base"));
        assert_eq!(catalog.ids().first().map(String::as_str), Some("base"));
    }

    #[test]
    fn test_agent_spec_json() {
        let json = r#"{
            "id": "planner",
            "spawnableAgents": ["context-pruner"],
            "failOnChildFailure": true,
            "steps": [{"spawn": {"agentType": "context-pruner"}}, "step", "step_all"]
        }"#;
        let spec: AgentSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.id, "planner");
        assert!(spec.fail_on_child_failure);
        assert_eq!(
            spec.steps,
            Some(vec![
                StepSpec::Spawn {
                    agent_type: CONTEXT_PRUNER.to_string(),
                    params: serde_json::Value::Null,
                },
                StepSpec::Step,
                StepSpec::StepAll,
            ])
        );
    }

    #[test]
    fn test_agent_spec_yaml_defaults() {
        let spec: AgentSpec = serde_yaml::from_str("id: helper\nspawnableAgents: [file-explorer]\n").unwrap();
        assert_eq!(spec.spawnable_agents, vec!["file-explorer".to_string()]);
        assert!(spec.steps.is_none());
        assert!(!spec.fail_on_child_failure);
    }

    #[test]
    fn test_register_overrides_builtin() {
        let mut catalog = AgentCatalog::with_builtins();
        let before = catalog.len();
        catalog.register_spec(AgentSpec::new("base").with_steps(vec![StepSpec::Step]));
        assert_eq!(catalog.len(), before);

        let mut program = catalog.get("base").unwrap().program(&serde_json::Value::Null);
        assert_eq!(drain(program.as_mut()), vec![Directive::RunStep]);
    }
}
