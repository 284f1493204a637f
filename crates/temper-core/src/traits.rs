//! Trait seams for the TEMPER refinement runtime.
//!
//! - `Agent`:            one sub-agent the router can dispatch to
//! - `Producer`:         whatever turns a task plus feedback into an artifact
//! - `Gate`:             the verification gate (binary verdict + score)
//! - `StrategySelector`: picks how to recover from a failed round
//! - `Debugger`:         repairs execution failures
//! - `DecisionLog`:      append-only audit sink, one chain per task
//! - `StateStore`:       persisted snapshots plus per-task leases
//!
//! The refinement loop only ever talks to these traits. Each component
//! crate provides the concrete implementation for one of them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use temper_contracts::{
    agent::{AgentId, AgentInput, AgentOutput, Phase, StateRef, TaskId},
    debug::{DebugSession, ExecutionFailure},
    error::TemperResult,
    record::DecisionRecord,
    routing::{FailureSignal, RefinementStrategy, StrategyChoice, StrategyRecommendation},
    verify::{Artifact, VerificationDecision, VerificationRequest},
};

use crate::persist::{StoreKey, TaskLease};

/// A sub-agent. May be backed by an LLM, a tool, or plain code, so its
/// output is validated at the boundary before anyone relies on it.
pub trait Agent: Send + Sync {
    fn id(&self) -> &AgentId;

    /// Handle one input. Must not touch the decision log or the store.
    fn invoke(&self, input: &AgentInput) -> TemperResult<AgentOutput>;
}

/// What the refinement loop asks the producer for in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProduceRequest {
    pub task_id: TaskId,
    pub phase: Phase,
    pub description: String,
    /// 1-based round being produced.
    pub round: u32,
    /// Every feedback item accumulated so far, oldest first.
    pub feedback: Vec<String>,
    /// Output of the round to build on after a truncate-from.
    pub base_artifact: Option<Value>,
    /// Extra steps requested by add-step strategies.
    pub added_steps: Vec<String>,
    /// Strategy chosen after the previous round, if any.
    pub strategy: Option<RefinementStrategy>,
    /// Where this task's refinement state is persisted.
    pub state: StateRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProducerOutcome {
    Artifact { artifact: Artifact },
    /// The work ran and failed at runtime or under test.
    ExecutionFailure { failure: ExecutionFailure },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Produced {
    pub outcome: ProducerOutcome,
    pub agents_invoked: Vec<AgentId>,
    /// Set when this round discovered that an earlier round's output
    /// invalidated the work built on it.
    pub invalidated_round: Option<u32>,
}

impl Produced {
    pub fn artifact(artifact: Artifact, agents_invoked: Vec<AgentId>) -> Self {
        Self {
            outcome: ProducerOutcome::Artifact { artifact },
            agents_invoked,
            invalidated_round: None,
        }
    }

    pub fn failure(failure: ExecutionFailure, agents_invoked: Vec<AgentId>) -> Self {
        Self {
            outcome: ProducerOutcome::ExecutionFailure { failure },
            agents_invoked,
            invalidated_round: None,
        }
    }

    pub fn with_invalidated_round(mut self, round: u32) -> Self {
        self.invalidated_round = Some(round);
        self
    }
}

pub trait Producer: Send + Sync {
    /// Produce the artifact for one round.
    ///
    /// A low-quality artifact is a normal result. `Err` is reserved for the
    /// producer itself breaking (e.g. `TemperError::AgentFailed`); the loop
    /// propagates it and the persisted state stays at the previous round.
    fn produce(&self, request: &ProduceRequest) -> TemperResult<Produced>;
}

/// The verification gate.
///
/// Implementations append every decision to the decision log before
/// returning it. A failed audit write is the only error case: an
/// unreadable artifact is an insufficient decision, not an `Err`.
pub trait Gate: Send + Sync {
    fn verify(&self, request: &VerificationRequest) -> TemperResult<VerificationDecision>;
}

pub trait StrategySelector: Send + Sync {
    /// Pick the refinement strategy for the next round. `recommendations`
    /// from other components join the candidate pool; the selector has the
    /// final say.
    fn select(
        &self,
        task_id: &TaskId,
        signal: &FailureSignal,
        recommendations: &[StrategyRecommendation],
    ) -> TemperResult<StrategyChoice>;
}

pub trait Debugger: Send + Sync {
    /// Run a bounded repair session against `failure`. The returned session
    /// is finished: either resolved or escalated.
    fn debug(&self, task_id: &TaskId, failure: &ExecutionFailure) -> TemperResult<DebugSession>;
}

/// The append-only decision log.
///
/// A failed write is fatal for the step in progress and surfaces as
/// `TemperError::AuditWriteFailed`.
pub trait DecisionLog: Send + Sync {
    fn append(&self, record: &DecisionRecord) -> TemperResult<()>;

    /// All records for `task_id`, oldest first.
    fn history(&self, task_id: &TaskId) -> TemperResult<Vec<DecisionRecord>>;
}

/// Key-value persistence for JSON snapshots.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &StoreKey) -> TemperResult<Option<Value>>;

    fn put(&self, key: &StoreKey, value: Value) -> TemperResult<()>;

    /// Atomic read-modify-write of one key. `apply` sees the current value
    /// and returns the value to store; an `Err` from `apply` leaves the key
    /// untouched.
    fn update(
        &self,
        key: &StoreKey,
        apply: &mut dyn FnMut(Option<Value>) -> TemperResult<Value>,
    ) -> TemperResult<Value>;

    /// Take the exclusive driver lease for `task_id`. Fails with
    /// `TemperError::TaskLocked` while another lease is alive.
    fn acquire(&self, task_id: &TaskId) -> TemperResult<TaskLease>;
}
