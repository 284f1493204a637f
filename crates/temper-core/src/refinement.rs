//! The refinement loop: bounded produce → verify rounds with smoothed
//! quality, early stopping, and escalation.
//!
//! Each round runs this pipeline:
//!
//!   Produce → [Debug] → Verify → EMA → Status → [Select strategy] → Persist
//!
//! The loop is an explicit state machine over `LoopStatus`. `Running` is
//! left through exactly one of three doors:
//!
//! - `EarlyStopped`: the smoothed score reached the early-stopping threshold
//! - `Succeeded`:    the raw score reached the quality threshold
//! - `Escalated`:    the round cap was hit, or the debugger gave up
//!
//! The state is persisted after every round, so a crash between rounds
//! loses nothing and `run` on an existing task resumes where it stopped.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use temper_contracts::{
    agent::{AgentId, Phase, TaskId},
    debug::{DebugSession, ExecutionFailure},
    error::{TemperError, TemperResult},
    record::{DecisionKind, DecisionRecord},
    refinement::{
        EscalationReason, IterationRecord, LoopOutcome, LoopSettings, LoopStatus, RefinementState,
    },
    routing::{FailureSignal, RefinementStrategy, StrategyChoice},
    verify::{Artifact, ArtifactType, JsonRuleSet, VerificationDecision, VerificationRequest},
};

use crate::persist;
use crate::traits::{
    Debugger, DecisionLog, Gate, ProduceRequest, Produced, Producer, ProducerOutcome, StateStore,
    StrategySelector,
};

const COMPONENT: &str = "refinement-loop";

/// Everything the loop needs to know about the work it refines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementTask {
    pub task_id: TaskId,
    pub phase: Phase,
    pub description: String,
    pub artifact_type: ArtifactType,
    /// Handed to the gate for the alignment dimension.
    pub source_spec: Option<String>,
    pub json_rules: Option<JsonRuleSet>,
    /// Only used when the task has no persisted state yet.
    pub settings: LoopSettings,
}

impl RefinementTask {
    pub fn new(
        task_id: TaskId,
        phase: Phase,
        description: impl Into<String>,
        artifact_type: ArtifactType,
        settings: LoopSettings,
    ) -> Self {
        Self {
            task_id,
            phase,
            description: description.into(),
            artifact_type,
            source_spec: None,
            json_rules: None,
            settings,
        }
    }

    pub fn with_source_spec(mut self, spec: impl Into<String>) -> Self {
        self.source_spec = Some(spec.into());
        self
    }

    pub fn with_json_rules(mut self, rules: JsonRuleSet) -> Self {
        self.json_rules = Some(rules);
        self
    }
}

/// What one round ended with, before the status is decided.
struct RoundResult {
    decision: VerificationDecision,
    output_snapshot: Value,
    agents_invoked: Vec<AgentId>,
    invalidated_round: Option<u32>,
    exhausted: Option<DebugSession>,
}

pub struct RefinementLoop {
    producer: Box<dyn Producer>,
    gate: Box<dyn Gate>,
    selector: Box<dyn StrategySelector>,
    debugger: Option<Box<dyn Debugger>>,
    store: Arc<dyn StateStore>,
    log: Arc<dyn DecisionLog>,
}

impl RefinementLoop {
    pub fn new(
        producer: Box<dyn Producer>,
        gate: Box<dyn Gate>,
        selector: Box<dyn StrategySelector>,
        store: Arc<dyn StateStore>,
        log: Arc<dyn DecisionLog>,
    ) -> Self {
        Self {
            producer,
            gate,
            selector,
            debugger: None,
            store,
            log,
        }
    }

    /// Without a debugger, execution failures are scored as rejected rounds
    /// and retried with the error as feedback.
    pub fn with_debugger(mut self, debugger: Box<dyn Debugger>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    /// Drive `task` to a terminal state.
    ///
    /// Holds the task lease for the whole run. If a state already exists
    /// for `(task_id, phase)` it is resumed; if that state is terminal its
    /// outcome is returned without invoking the producer.
    ///
    /// # Errors
    ///
    /// `TaskLocked` if another driver holds the lease; `AuditWriteFailed`,
    /// `Store`, and producer errors abort the run with the last completed
    /// round persisted. Falling short of the threshold is never an error.
    pub fn run(&self, task: &RefinementTask) -> TemperResult<LoopOutcome> {
        let _lease = self.store.acquire(&task.task_id)?;

        let mut state = match persist::load_refinement(&*self.store, &task.task_id, task.phase)? {
            Some(state) => {
                info!(
                    task_id = %task.task_id,
                    phase = %task.phase,
                    round = state.current_round(),
                    status = ?state.status(),
                    "resuming refinement"
                );
                state
            }
            None => {
                let state =
                    RefinementState::new(task.task_id.clone(), task.phase, task.settings)?;
                persist::save_refinement(&*self.store, &state)?;
                debug!(task_id = %task.task_id, phase = %task.phase, "refinement started");
                state
            }
        };

        while !state.status().is_terminal() {
            self.step(task, &mut state)?;
        }
        outcome_of(state)
    }

    /// Run one round and persist the result.
    fn step(&self, task: &RefinementTask, state: &mut RefinementState) -> TemperResult<()> {
        let round = state.current_round() + 1;
        let settings = *state.settings();
        let started = Instant::now();

        let request = ProduceRequest {
            task_id: task.task_id.clone(),
            phase: task.phase,
            description: task.description.clone(),
            round,
            feedback: state.feedback().to_vec(),
            base_artifact: state.base_round().and_then(|r| state.output_of(r).cloned()),
            added_steps: state.added_steps().to_vec(),
            strategy: state.records().last().and_then(|r| r.next_strategy.clone()),
            state: state.state_ref(),
        };
        let input_snapshot = serde_json::to_value(&request).map_err(|e| TemperError::Store {
            reason: format!("failed to snapshot round {round} input: {e}"),
        })?;

        debug!(task_id = %task.task_id, round, "producing");
        let produced = self.producer.produce(&request)?;
        let result = self.evaluate(task, state, produced)?;

        let quality = result.decision.quality_score;
        let ema = match state.ema_quality() {
            Some(previous) => settings.ema_alpha * quality + (1.0 - settings.ema_alpha) * previous,
            None => quality,
        };

        let status = if result.exhausted.is_some() {
            LoopStatus::Escalated
        } else if ema >= settings.early_stopping_threshold {
            LoopStatus::EarlyStopped
        } else if result.decision.is_sufficient() {
            LoopStatus::Succeeded
        } else if round >= settings.max_rounds {
            LoopStatus::Escalated
        } else {
            LoopStatus::Running
        };

        if matches!(status, LoopStatus::Running | LoopStatus::Escalated) {
            state.add_feedback(result.decision.feedback.iter().cloned())?;
        }

        let choice = if status == LoopStatus::Running {
            let mut signal = FailureSignal::from_decision(&result.decision);
            signal.invalidated_round = match result.invalidated_round {
                Some(index) if index == 0 || index > round => {
                    warn!(
                        task_id = %task.task_id,
                        round,
                        invalidated = index,
                        "ignoring invalidated round outside the recorded rounds"
                    );
                    None
                }
                other => other,
            };
            Some(self.choose(&task.task_id, &signal)?)
        } else {
            None
        };

        let record = IterationRecord {
            round,
            recorded_at: Utc::now(),
            input_snapshot,
            output_snapshot: result.output_snapshot,
            decision: result.decision,
            quality_score: quality,
            ema_quality: ema,
            elapsed_ms: started.elapsed().as_millis() as u64,
            agents_invoked: result.agents_invoked,
            next_strategy: choice.as_ref().map(|c| c.strategy.clone()),
        };
        state.apply_round(record, status)?;

        match (&choice, status) {
            (Some(choice), _) => apply_strategy(state, &choice.strategy)?,
            (None, LoopStatus::Escalated) => {
                let reason = match result.exhausted {
                    Some(session) => EscalationReason::DebugExhausted {
                        session: Box::new(session),
                    },
                    None => EscalationReason::RoundCap {
                        max_rounds: settings.max_rounds,
                    },
                };
                state.set_escalation(reason.clone())?;
                self.log
                    .append(&DecisionRecord::new(
                        task.task_id.clone(),
                        COMPONENT,
                        DecisionKind::Escalation { reason },
                    ))?;
                warn!(
                    task_id = %task.task_id,
                    round,
                    quality,
                    "refinement escalated"
                );
            }
            (None, _) => {
                info!(
                    task_id = %task.task_id,
                    round,
                    quality,
                    ema,
                    status = ?status,
                    "refinement finished"
                );
            }
        }

        persist::save_refinement(&*self.store, state)
    }

    /// Turn the producer's result into a decision, running the debugger on
    /// execution failures when one is configured.
    fn evaluate(
        &self,
        task: &RefinementTask,
        state: &RefinementState,
        produced: Produced,
    ) -> TemperResult<RoundResult> {
        let Produced {
            outcome,
            agents_invoked,
            invalidated_round,
        } = produced;

        let failure = match outcome {
            ProducerOutcome::Artifact { artifact } => {
                let output_snapshot = json!({ "artifact": artifact });
                return Ok(RoundResult {
                    decision: self.verify(task, artifact)?,
                    output_snapshot,
                    agents_invoked,
                    invalidated_round,
                    exhausted: None,
                });
            }
            ProducerOutcome::ExecutionFailure { failure } => failure,
        };

        warn!(
            task_id = %task.task_id,
            error = %failure.error_message,
            "round ended in an execution failure"
        );
        let choice = self.choose(
            &task.task_id,
            &FailureSignal::from_execution_failure(failure.clone()),
        )?;

        let debugger = match (&choice.strategy, &self.debugger) {
            (RefinementStrategy::RouteToDebug, Some(debugger)) => debugger,
            _ => {
                return Ok(RoundResult {
                    decision: rejected_failure(task, state, &failure),
                    output_snapshot: json!({ "failure": failure }),
                    agents_invoked,
                    invalidated_round,
                    exhausted: None,
                })
            }
        };

        let session = debugger.debug(&task.task_id, &failure)?;
        persist::save_debug_session(&*self.store, &session)?;
        let output_snapshot = json!({ "failure": failure, "debug_session": session });

        match session.final_artifact() {
            Some(code) if session.success() => {
                info!(
                    task_id = %task.task_id,
                    attempts = session.total_iterations(),
                    "debug session resolved the failure"
                );
                let artifact = Artifact::inline(task.artifact_type, code);
                Ok(RoundResult {
                    decision: self.verify(task, artifact)?,
                    output_snapshot,
                    agents_invoked,
                    invalidated_round,
                    exhausted: None,
                })
            }
            _ => Ok(RoundResult {
                decision: rejected_failure(task, state, &failure),
                output_snapshot,
                agents_invoked,
                invalidated_round,
                exhausted: Some(session),
            }),
        }
    }

    fn verify(&self, task: &RefinementTask, artifact: Artifact) -> TemperResult<VerificationDecision> {
        let mut request = VerificationRequest::new(task.task_id.clone(), task.phase, artifact);
        request.source_spec = task.source_spec.clone();
        request.json_rules = task.json_rules.clone();
        self.gate.verify(&request)
    }

    fn choose(&self, task_id: &TaskId, signal: &FailureSignal) -> TemperResult<StrategyChoice> {
        let choice = self.selector.select(task_id, signal, &[])?;
        debug!(
            task_id = %task_id,
            strategy = choice.strategy.name(),
            fit = choice.fit,
            "refinement strategy selected"
        );
        self.log.append(&DecisionRecord::new(
            task_id.clone(),
            COMPONENT,
            DecisionKind::RefinementStrategy {
                strategy: choice.strategy.clone(),
                rationale: choice.rationale.clone(),
            },
        ))?;
        Ok(choice)
    }
}

fn rejected_failure(
    task: &RefinementTask,
    state: &RefinementState,
    failure: &ExecutionFailure,
) -> VerificationDecision {
    VerificationDecision::rejected(
        task.task_id.clone(),
        task.phase,
        state.settings().quality_threshold,
        "execution-failed",
        format!("execution failed: {}", failure.error_message),
    )
}

fn apply_strategy(state: &mut RefinementState, strategy: &RefinementStrategy) -> TemperResult<()> {
    match strategy {
        RefinementStrategy::TruncateFrom { index } => state.truncate_from(*index),
        RefinementStrategy::AddStep { description } => state.add_step(description.clone()),
        RefinementStrategy::RetryWithFeedback | RefinementStrategy::RouteToDebug => Ok(()),
    }
}

fn outcome_of(state: RefinementState) -> TemperResult<LoopOutcome> {
    match state.status() {
        LoopStatus::Succeeded => Ok(LoopOutcome::Succeeded { state }),
        LoopStatus::EarlyStopped => Ok(LoopOutcome::EarlyStopped { state }),
        LoopStatus::Escalated => {
            let reason = state
                .escalation()
                .cloned()
                .unwrap_or(EscalationReason::RoundCap {
                    max_rounds: state.max_rounds(),
                });
            Ok(LoopOutcome::Escalated { state, reason })
        }
        LoopStatus::Running => Err(TemperError::StateMachine {
            reason: format!("task '{}' is still running", state.task_id()),
        }),
    }
}
