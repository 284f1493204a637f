//! Hand-written trait doubles shared by the unit tests in this crate.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use temper_contracts::{
    agent::TaskId,
    debug::{DebugSession, ExecutionFailure},
    error::{TemperError, TemperResult},
    record::DecisionRecord,
    routing::{FailureSignal, RefinementStrategy, StrategyChoice, StrategyRecommendation},
    verify::{ArtifactRef, VerificationDecision, VerificationRequest},
};

use crate::persist::{StoreKey, TaskLease};
use crate::traits::{
    Debugger, DecisionLog, Gate, ProduceRequest, Produced, Producer, StateStore, StrategySelector,
};

#[derive(Clone, Default)]
pub struct MockStore {
    pub values: Arc<Mutex<BTreeMap<StoreKey, Value>>>,
    pub leases: Arc<Mutex<BTreeSet<TaskId>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MockStore {
    fn get(&self, key: &StoreKey) -> TemperResult<Option<Value>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &StoreKey, value: Value) -> TemperResult<()> {
        self.values.lock().unwrap().insert(key.clone(), value);
        Ok(())
    }

    fn update(
        &self,
        key: &StoreKey,
        apply: &mut dyn FnMut(Option<Value>) -> TemperResult<Value>,
    ) -> TemperResult<Value> {
        let mut values = self.values.lock().unwrap();
        let next = apply(values.get(key).cloned())?;
        values.insert(key.clone(), next.clone());
        Ok(next)
    }

    fn acquire(&self, task_id: &TaskId) -> TemperResult<TaskLease> {
        if !self.leases.lock().unwrap().insert(task_id.clone()) {
            return Err(TemperError::TaskLocked {
                task_id: task_id.to_string(),
            });
        }
        let leases = self.leases.clone();
        let held = task_id.clone();
        Ok(TaskLease::new(task_id.clone(), move || {
            leases.lock().unwrap().remove(&held);
        }))
    }
}

#[derive(Clone, Default)]
pub struct MockLog {
    pub records: Arc<Mutex<Vec<DecisionRecord>>>,
}

impl MockLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.records.lock().unwrap().iter().map(|r| r.kind.label()).collect()
    }
}

impl DecisionLog for MockLog {
    fn append(&self, record: &DecisionRecord) -> TemperResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn history(&self, task_id: &TaskId) -> TemperResult<Vec<DecisionRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.task_id == task_id)
            .cloned()
            .collect())
    }
}

/// A log whose writes always fail.
pub struct BrokenLog;

impl DecisionLog for BrokenLog {
    fn append(&self, _record: &DecisionRecord) -> TemperResult<()> {
        Err(TemperError::AuditWriteFailed {
            reason: "disk full".to_string(),
        })
    }

    fn history(&self, _task_id: &TaskId) -> TemperResult<Vec<DecisionRecord>> {
        Ok(vec![])
    }
}

/// Returns the scripted results in order, repeating the last one.
pub struct ScriptedProducer {
    pub script: Vec<Produced>,
    pub requests: Arc<Mutex<Vec<ProduceRequest>>>,
}

impl ScriptedProducer {
    pub fn new(script: Vec<Produced>) -> Self {
        Self {
            script,
            requests: Arc::new(Mutex::new(vec![])),
        }
    }
}

impl Producer for ScriptedProducer {
    fn produce(&self, request: &ProduceRequest) -> TemperResult<Produced> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len().min(self.script.len() - 1);
        requests.push(request.clone());
        Ok(self.script[index].clone())
    }
}

/// Scores an inline artifact by parsing its content as a float.
pub struct ScoreGate {
    pub log: Arc<dyn DecisionLog>,
}

impl Gate for ScoreGate {
    fn verify(&self, request: &VerificationRequest) -> TemperResult<VerificationDecision> {
        let score: f64 = match &request.artifact.reference {
            ArtifactRef::Inline { content } => content.parse().unwrap_or(0.0),
            ArtifactRef::Path { .. } => 0.0,
        };
        let decision = VerificationDecision::from_scores(
            request.task_id.clone(),
            request.phase,
            0.85,
            score,
            BTreeMap::new(),
            vec![format!("score {score} is below 0.85")],
            vec!["score".to_string()],
            vec![],
        )?;
        self.log.append(&DecisionRecord::new(
            request.task_id.clone(),
            "score-gate",
            temper_contracts::record::DecisionKind::Verification {
                decision: decision.clone(),
            },
        ))?;
        Ok(decision)
    }
}

/// Picks route-to-debug for execution failures, truncate-from when a round
/// was invalidated, retry otherwise. Records every signal it sees.
#[derive(Default)]
pub struct SimpleSelector {
    pub signals: Arc<Mutex<Vec<FailureSignal>>>,
}

impl StrategySelector for SimpleSelector {
    fn select(
        &self,
        _task_id: &TaskId,
        signal: &FailureSignal,
        _recommendations: &[StrategyRecommendation],
    ) -> TemperResult<StrategyChoice> {
        self.signals.lock().unwrap().push(signal.clone());
        let strategy = if signal.execution_failure.is_some() {
            RefinementStrategy::RouteToDebug
        } else if let Some(index) = signal.invalidated_round {
            RefinementStrategy::TruncateFrom { index }
        } else if let Some(missing) = signal.missing_checks.first() {
            RefinementStrategy::AddStep {
                description: format!("produce {missing}"),
            }
        } else {
            RefinementStrategy::RetryWithFeedback
        };
        Ok(StrategyChoice {
            strategy,
            fit: 1.0,
            rationale: "test selector".to_string(),
        })
    }
}

/// Resolves with a fixed artifact, or escalates after `attempts` when
/// `fixed` is `None`.
pub struct FixedDebugger {
    pub fixed: Option<String>,
}

impl Debugger for FixedDebugger {
    fn debug(&self, task_id: &TaskId, failure: &ExecutionFailure) -> TemperResult<DebugSession> {
        use temper_contracts::debug::{DebugAttempt, ErrorPattern, TestOutcome};

        let mut session = DebugSession::open(task_id.clone(), 5)?;
        session.push_attempt(DebugAttempt {
            attempt: 1,
            error_pattern: ErrorPattern::Logic,
            error_message: failure.error_message.clone(),
            stack_trace: failure.stack_trace.clone(),
            repair_description: "scripted".to_string(),
            repaired_code: self.fixed.clone().unwrap_or_else(|| failure.artifact.clone()),
            test_outcome: if self.fixed.is_some() {
                TestOutcome::Passed
            } else {
                TestOutcome::NotRun {
                    reason: "no repair".to_string(),
                }
            },
            rationale: "scripted".to_string(),
            attempted_at: chrono::Utc::now(),
        })?;
        match &self.fixed {
            Some(code) => session.resolve(code.clone())?,
            None => session.escalate()?,
        }
        Ok(session)
    }
}
