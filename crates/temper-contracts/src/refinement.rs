//! Refinement state: the persisted record of one task/phase refinement.
//!
//! The state is created at round 0 and advanced one `IterationRecord` at a
//! time through `apply_round`, which rejects out-of-order rounds, rounds past
//! the cap, and any change after a terminal status. The refinement loop
//! decides *which* status a round leads to; this type guarantees the history
//! stays well-formed whatever the loop decides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    agent::{AgentId, Phase, StateRef, TaskId},
    debug::DebugSession,
    error::{TemperError, TemperResult},
    routing::RefinementStrategy,
    verify::VerificationDecision,
};

/// Refinement loop states. `Running` is the only non-terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopStatus {
    Running,
    Succeeded,
    EarlyStopped,
    Escalated,
}

impl LoopStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopStatus::Running)
    }
}

/// Why a refinement was handed to a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum EscalationReason {
    /// `max_rounds` rounds ran without reaching the quality threshold.
    RoundCap { max_rounds: u32 },
    /// The auto-debug loop used every attempt without a passing test.
    DebugExhausted { session: Box<DebugSession> },
}

/// Tunables frozen into a state when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopSettings {
    pub max_rounds: u32,
    pub quality_threshold: f64,
    pub early_stopping_threshold: f64,
    pub ema_alpha: f64,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            quality_threshold: 0.85,
            early_stopping_threshold: 0.95,
            ema_alpha: 0.3,
        }
    }
}

impl LoopSettings {
    pub fn validate(&self) -> TemperResult<()> {
        if self.max_rounds == 0 {
            return Err(TemperError::Config {
                reason: "max_rounds must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) || self.quality_threshold == 0.0 {
            return Err(TemperError::Config {
                reason: format!("quality threshold {} outside (0, 1]", self.quality_threshold),
            });
        }
        if self.early_stopping_threshold <= self.quality_threshold
            || self.early_stopping_threshold > 1.0
        {
            return Err(TemperError::Config {
                reason: format!(
                    "early stopping threshold {} must be above the quality threshold {} and at most 1",
                    self.early_stopping_threshold, self.quality_threshold
                ),
            });
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(TemperError::Config {
                reason: format!("ema alpha {} outside (0, 1]", self.ema_alpha),
            });
        }
        Ok(())
    }
}

/// One produce → verify cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based round number.
    pub round: u32,
    pub recorded_at: DateTime<Utc>,
    /// What the producer was asked for.
    pub input_snapshot: Value,
    /// What the producer (or the debugger) returned.
    pub output_snapshot: Value,
    pub decision: VerificationDecision,
    pub quality_score: f64,
    /// The smoothed score after this round.
    pub ema_quality: f64,
    pub elapsed_ms: u64,
    pub agents_invoked: Vec<AgentId>,
    /// The strategy chosen for the following round, if the round failed.
    pub next_strategy: Option<RefinementStrategy>,
}

/// The persisted refinement of one task in one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementState {
    task_id: TaskId,
    phase: Phase,
    current_round: u32,
    settings: LoopSettings,
    records: Vec<IterationRecord>,
    feedback: Vec<String>,
    ema_quality: Option<f64>,
    status: LoopStatus,
    escalation: Option<EscalationReason>,
    base_round: Option<u32>,
    added_steps: Vec<String>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RefinementState {
    /// A fresh state at round 0.
    pub fn new(task_id: TaskId, phase: Phase, settings: LoopSettings) -> TemperResult<Self> {
        settings.validate()?;
        let now = Utc::now();
        Ok(Self {
            task_id,
            phase,
            current_round: 0,
            settings,
            records: Vec::new(),
            feedback: Vec::new(),
            ema_quality: None,
            status: LoopStatus::Running,
            escalation: None,
            base_round: None,
            added_steps: Vec::new(),
            started_at: now,
            updated_at: now,
        })
    }

    /// Append the record for the next round and move to `status`.
    pub fn apply_round(&mut self, record: IterationRecord, status: LoopStatus) -> TemperResult<()> {
        self.ensure_running()?;
        let expected = self.current_round + 1;
        if record.round != expected {
            return Err(TemperError::StateMachine {
                reason: format!(
                    "task '{}' expected round {expected}, got {}",
                    self.task_id, record.round
                ),
            });
        }
        if record.round > self.settings.max_rounds {
            return Err(TemperError::StateMachine {
                reason: format!(
                    "task '{}' round {} exceeds cap {}",
                    self.task_id, record.round, self.settings.max_rounds
                ),
            });
        }
        if status == LoopStatus::Running && record.round == self.settings.max_rounds {
            return Err(TemperError::StateMachine {
                reason: format!(
                    "task '{}' reached the round cap but was left running",
                    self.task_id
                ),
            });
        }
        self.ema_quality = Some(record.ema_quality);
        self.current_round = record.round;
        self.records.push(record);
        self.status = status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record why the state escalated. Only valid once escalated.
    pub fn set_escalation(&mut self, reason: EscalationReason) -> TemperResult<()> {
        if self.status != LoopStatus::Escalated {
            return Err(TemperError::StateMachine {
                reason: format!("task '{}' is not escalated", self.task_id),
            });
        }
        self.escalation = Some(reason);
        Ok(())
    }

    pub fn add_feedback(&mut self, items: impl IntoIterator<Item = String>) -> TemperResult<()> {
        self.ensure_running()?;
        self.feedback.extend(items);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Resume subsequent rounds from the output of round `round`.
    pub fn truncate_from(&mut self, round: u32) -> TemperResult<()> {
        self.ensure_running()?;
        if round == 0 || round > self.current_round {
            return Err(TemperError::StateMachine {
                reason: format!(
                    "task '{}' cannot truncate to round {round} (current round {})",
                    self.task_id, self.current_round
                ),
            });
        }
        self.base_round = Some(round);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn add_step(&mut self, description: String) -> TemperResult<()> {
        self.ensure_running()?;
        if !self.added_steps.contains(&description) {
            self.added_steps.push(description);
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_running(&self) -> TemperResult<()> {
        if self.status.is_terminal() {
            return Err(TemperError::StateMachine {
                reason: format!("task '{}' already finished as {:?}", self.task_id, self.status),
            });
        }
        Ok(())
    }

    pub fn state_ref(&self) -> StateRef {
        StateRef {
            task_id: self.task_id.clone(),
            phase: self.phase,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn max_rounds(&self) -> u32 {
        self.settings.max_rounds
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }

    /// `None` until the first round completes.
    pub fn ema_quality(&self) -> Option<f64> {
        self.ema_quality
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    pub fn escalation(&self) -> Option<&EscalationReason> {
        self.escalation.as_ref()
    }

    pub fn base_round(&self) -> Option<u32> {
        self.base_round
    }

    pub fn added_steps(&self) -> &[String] {
        &self.added_steps
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The output snapshot of `round`, if that round was recorded.
    pub fn output_of(&self, round: u32) -> Option<&Value> {
        self.records
            .iter()
            .find(|r| r.round == round)
            .map(|r| &r.output_snapshot)
    }
}

/// What `RefinementLoop::run` returns. Every variant carries the full state,
/// so the complete iteration history travels with the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum LoopOutcome {
    Succeeded { state: RefinementState },
    EarlyStopped { state: RefinementState },
    Escalated {
        state: RefinementState,
        reason: EscalationReason,
    },
}

impl LoopOutcome {
    pub fn state(&self) -> &RefinementState {
        match self {
            LoopOutcome::Succeeded { state }
            | LoopOutcome::EarlyStopped { state }
            | LoopOutcome::Escalated { state, .. } => state,
        }
    }

    pub fn status(&self) -> LoopStatus {
        self.state().status()
    }
}
