//! Agent identity and the request/response envelopes every component speaks.
//!
//! `AgentInput` and `AgentOutput` are immutable once constructed: their
//! fields are private and no mutators exist, so an output written to the
//! audit trail is exactly the output that was produced. `AgentContext` is
//! the one container that grows, and it only ever grows by appending.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TemperError, TemperResult};

/// Stable, human-readable identifier for an agent.
///
/// Used across routing tables, decision logs, and dispatch registries.
/// Example: AgentId("backend-agent")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique identifier for a task.
///
/// Every persisted snapshot and every decision-log chain is partitioned by
/// this id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh task id backed by a v4 UUID.
    pub fn generate() -> Self {
        Self(format!("task-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The workflow phase a task is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Specification,
    Planning,
    Implementation,
    Validation,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Specification,
        Phase::Planning,
        Phase::Implementation,
        Phase::Validation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Specification => "specification",
            Phase::Planning => "planning",
            Phase::Implementation => "implementation",
            Phase::Validation => "validation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-owning pointer from an `AgentContext` to the refinement state that
/// is currently in flight. The persistence layer owns the state itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateRef {
    pub task_id: TaskId,
    pub phase: Phase,
}

/// Everything an agent may need to know about the task's history.
///
/// The context is append-only: outputs and feedback are pushed in
/// chronological order and never rewritten, so the history it carries can be
/// replayed and checked against the decision log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    spec_path: Option<PathBuf>,
    plan_path: Option<PathBuf>,
    history: Vec<AgentOutput>,
    feedback: Vec<String>,
    refinement: Option<StateRef>,
}

impl AgentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spec_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec_path = Some(path.into());
        self
    }

    pub fn with_plan_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan_path = Some(path.into());
        self
    }

    pub fn spec_path(&self) -> Option<&PathBuf> {
        self.spec_path.as_ref()
    }

    pub fn plan_path(&self) -> Option<&PathBuf> {
        self.plan_path.as_ref()
    }

    /// All prior outputs for this task, oldest first.
    pub fn history(&self) -> &[AgentOutput] {
        &self.history
    }

    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }

    pub fn refinement(&self) -> Option<&StateRef> {
        self.refinement.as_ref()
    }

    /// Append an output to the history.
    ///
    /// Outputs created before the most recent recorded output would break
    /// chronological order and are rejected.
    pub fn record_output(&mut self, output: AgentOutput) -> TemperResult<()> {
        if let Some(last) = self.history.last() {
            if output.created_at() < last.created_at() {
                return Err(TemperError::InputContract {
                    reason: format!(
                        "output from '{}' predates the last recorded output",
                        output.agent_id()
                    ),
                });
            }
        }
        self.history.push(output);
        Ok(())
    }

    pub fn add_feedback(&mut self, items: impl IntoIterator<Item = String>) {
        self.feedback.extend(items);
    }

    /// Attach the refinement state this context is working under. Set-once:
    /// re-attaching the same state is a no-op, attaching a different one is
    /// an error.
    pub fn attach_refinement(&mut self, state: StateRef) -> TemperResult<()> {
        match &self.refinement {
            None => {
                self.refinement = Some(state);
                Ok(())
            }
            Some(existing) if *existing == state => Ok(()),
            Some(existing) => Err(TemperError::StateMachine {
                reason: format!(
                    "context already attached to {}/{}",
                    existing.task_id, existing.phase
                ),
            }),
        }
    }
}

/// An immutable request delivered to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInput {
    agent_id: AgentId,
    task_id: TaskId,
    phase: Phase,
    payload: Value,
    context: AgentContext,
}

impl AgentInput {
    /// Build a validated input. Empty agent or task ids are contract
    /// violations and are rejected outright.
    pub fn new(
        agent_id: AgentId,
        task_id: TaskId,
        phase: Phase,
        payload: Value,
        context: AgentContext,
    ) -> TemperResult<Self> {
        if agent_id.0.trim().is_empty() {
            return Err(TemperError::InputContract {
                reason: "agent id must not be empty".to_string(),
            });
        }
        if task_id.0.trim().is_empty() {
            return Err(TemperError::InputContract {
                reason: "task id must not be empty".to_string(),
            });
        }
        Ok(Self {
            agent_id,
            task_id,
            phase,
            payload,
            context,
        })
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }
}

/// An immutable response produced by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    agent_id: AgentId,
    task_id: TaskId,
    success: bool,
    payload: Value,
    rationale: String,
    confidence: f64,
    next_actions: Vec<String>,
    created_at: DateTime<Utc>,
}

impl AgentOutput {
    /// Build a validated output stamped with the current time.
    ///
    /// The rationale must be non-blank and the confidence must lie in
    /// `[0.0, 1.0]`.
    pub fn new(
        agent_id: AgentId,
        task_id: TaskId,
        success: bool,
        payload: Value,
        rationale: impl Into<String>,
        confidence: f64,
        next_actions: Vec<String>,
    ) -> TemperResult<Self> {
        let output = Self {
            agent_id,
            task_id,
            success,
            payload,
            rationale: rationale.into(),
            confidence,
            next_actions,
            created_at: Utc::now(),
        };
        output.validate()?;
        Ok(output)
    }

    /// Re-check the construction invariants. Outputs that arrive through
    /// deserialization bypass `new`, so consumers call this at the boundary.
    pub fn validate(&self) -> TemperResult<()> {
        if self.rationale.trim().is_empty() {
            return Err(TemperError::InputContract {
                reason: format!("output from '{}' has an empty rationale", self.agent_id),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(TemperError::InputContract {
                reason: format!(
                    "output from '{}' has confidence {} outside [0, 1]",
                    self.agent_id, self.confidence
                ),
            });
        }
        if self.created_at > Utc::now() {
            return Err(TemperError::InputContract {
                reason: format!("output from '{}' is timestamped in the future", self.agent_id),
            });
        }
        Ok(())
    }

    /// Check that this output answers `input`.
    pub fn ensure_answers(&self, input: &AgentInput) -> TemperResult<()> {
        if self.task_id != input.task_id {
            return Err(TemperError::InputContract {
                reason: format!(
                    "output task id '{}' does not match input task id '{}'",
                    self.task_id, input.task_id
                ),
            });
        }
        Ok(())
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn next_actions(&self) -> &[String] {
        &self.next_actions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
