//! The auto-debug loop.
//!
//! Each attempt classifies the current failure, takes the first guarded
//! repair proposal not tried before, re-runs the tests against it and
//! records the attempt. A passing test resolves the session; running out
//! of attempts or of proposals escalates it.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use temper_contracts::{
    agent::TaskId,
    debug::{DebugAttempt, DebugSession, ExecutionFailure, TestOutcome},
    error::TemperResult,
    record::{DecisionKind, DecisionRecord},
};
use temper_core::{
    config::DebugConfig,
    persist::save_debug_session,
    traits::{Debugger, DecisionLog, StateStore},
};

use crate::classify::{Classification, Classifier};
use crate::guard::ExpectationGuard;
use crate::repair::{builtin_strategies, Repair, RepairContext, RepairStrategy};
use crate::runner::TestRunner;

const COMPONENT: &str = "auto-debug";

#[derive(Debug, Clone, PartialEq)]
pub struct DebugRequest {
    pub task_id: TaskId,
    pub failure: ExecutionFailure,
}

pub struct AutoDebugLoop {
    classifier: Classifier,
    strategies: Vec<Box<dyn RepairStrategy>>,
    guard: ExpectationGuard,
    runner: Arc<dyn TestRunner>,
    store: Arc<dyn StateStore>,
    log: Arc<dyn DecisionLog>,
    max_iterations: u32,
}

/// Why no repair could be applied this attempt.
enum NoRepair {
    NothingProposed,
    Guarded(String),
}

impl AutoDebugLoop {
    pub fn new(
        runner: Arc<dyn TestRunner>,
        store: Arc<dyn StateStore>,
        log: Arc<dyn DecisionLog>,
    ) -> Self {
        Self {
            classifier: Classifier::default(),
            strategies: builtin_strategies(),
            guard: ExpectationGuard,
            runner,
            store,
            log,
            max_iterations: DebugConfig::default().max_iterations,
        }
    }

    /// Cap the session at `max_iterations` attempts (1 to 5; checked when
    /// the session opens).
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_config(self, config: &DebugConfig) -> Self {
        self.with_max_iterations(config.max_iterations)
    }

    /// Try `strategy` before the built-in ones.
    pub fn with_strategy(mut self, strategy: Box<dyn RepairStrategy>) -> Self {
        self.strategies.insert(0, strategy);
        self
    }

    pub fn run(&self, request: &DebugRequest) -> TemperResult<DebugSession> {
        let task_id = &request.task_id;
        let original = &request.failure.artifact;
        let mut session = DebugSession::open(task_id.clone(), self.max_iterations)?;
        let mut code = original.clone();
        let mut error_message = request.failure.error_message.clone();
        let mut stack_trace = request.failure.stack_trace.clone();
        let mut tried: HashSet<String> = HashSet::from([code.clone()]);

        info!(task_id = %task_id, max_attempts = self.max_iterations, "debug session opened");

        for attempt in 1..=self.max_iterations {
            let classification = self.classifier.classify(&error_message, &stack_trace);
            let ctx = RepairContext {
                code: &code,
                error_message: &error_message,
                stack_trace: &stack_trace,
                pattern: classification.pattern,
                attempt,
            };
            debug!(
                task_id = %task_id,
                attempt,
                pattern = %classification.pattern,
                rule = classification.rule.unwrap_or("fallback"),
                "failure classified"
            );

            let (repair, outcome) = match self.propose(&ctx, original, &tried) {
                Ok((strategy, repair)) => {
                    tried.insert(repair.code.clone());
                    let outcome = self.runner.run(&repair.code)?;
                    debug!(task_id = %task_id, attempt, strategy, passed = outcome.passed(), "repair tested");
                    (repair, outcome)
                }
                Err(reason) => {
                    let reason = match reason {
                        NoRepair::NothingProposed => format!(
                            "no repair strategy could address this {} error",
                            classification.pattern
                        ),
                        NoRepair::Guarded(detail) => detail,
                    };
                    let repair = Repair {
                        code: code.clone(),
                        description: "no repair applied".to_string(),
                        rationale: reason.clone(),
                    };
                    (repair, TestOutcome::NotRun { reason })
                }
            };

            let record = self.record(&mut session, attempt, &classification, &ctx, &repair, &outcome)?;
            match outcome {
                TestOutcome::Passed => {
                    session.resolve(record.repaired_code)?;
                    info!(task_id = %task_id, attempts = attempt, "debug session resolved");
                    break;
                }
                TestOutcome::NotRun { reason } => {
                    warn!(task_id = %task_id, attempt, reason = %reason, "no repair to try, escalating");
                    break;
                }
                TestOutcome::Failed {
                    error_message: next_message,
                    stack_trace: next_trace,
                } => {
                    code = repair.code;
                    error_message = next_message;
                    stack_trace = next_trace;
                }
            }
        }

        if !session.is_finished() {
            session.escalate()?;
            warn!(
                task_id = %task_id,
                attempts = session.total_iterations(),
                "debug session escalated"
            );
        }
        save_debug_session(self.store.as_ref(), &session)?;
        Ok(session)
    }

    /// The first proposal that is new and leaves the expectations alone.
    fn propose(
        &self,
        ctx: &RepairContext<'_>,
        original: &str,
        tried: &HashSet<String>,
    ) -> Result<(&'static str, Repair), NoRepair> {
        let mut guarded = None;
        for strategy in self.strategies.iter().filter(|s| s.handles(ctx.pattern)) {
            let Some(repair) = strategy.propose(ctx) else {
                continue;
            };
            if tried.contains(&repair.code) {
                continue;
            }
            if let Err(e) = self.guard.check(original, &repair.code) {
                warn!(strategy = strategy.name(), error = %e, "repair rejected");
                guarded = Some(e.to_string());
                continue;
            }
            return Ok((strategy.name(), repair));
        }
        Err(guarded.map_or(NoRepair::NothingProposed, NoRepair::Guarded))
    }

    fn record(
        &self,
        session: &mut DebugSession,
        attempt: u32,
        classification: &Classification,
        ctx: &RepairContext<'_>,
        repair: &Repair,
        outcome: &TestOutcome,
    ) -> TemperResult<DebugAttempt> {
        let record = DebugAttempt {
            attempt,
            error_pattern: classification.pattern,
            error_message: ctx.error_message.to_string(),
            stack_trace: ctx.stack_trace.to_string(),
            repair_description: repair.description.clone(),
            repaired_code: repair.code.clone(),
            test_outcome: outcome.clone(),
            rationale: repair.rationale.clone(),
            attempted_at: chrono::Utc::now(),
        };
        session.push_attempt(record.clone())?;
        self.log.append(&DecisionRecord::new(
            session.task_id().clone(),
            COMPONENT,
            DecisionKind::DebugAttempt {
                attempt: record.clone(),
            },
        ))?;
        save_debug_session(self.store.as_ref(), session)?;
        Ok(record)
    }
}

impl Debugger for AutoDebugLoop {
    fn debug(&self, task_id: &TaskId, failure: &ExecutionFailure) -> TemperResult<DebugSession> {
        self.run(&DebugRequest {
            task_id: task_id.clone(),
            failure: failure.clone(),
        })
    }
}
