//! Scenario 3: Debug and repair
//!
//! The code agent's first draft of `add()` has a test loop whose `for`
//! header is missing its colon, and its own test run reports a
//! `SyntaxError`. The refinement loop routes the
//! failure to the auto-debug loop, which classifies it, appends the colon,
//! re-runs the tests, and hands the repaired code back to the gate in the
//! same round.
//!
//!   produce → execution failure → route-to-debug → classify (syntax)
//!           → missing-colon repair → tests pass → gate → early-stopped

use std::sync::Arc;

use temper_audit::InMemoryDecisionLog;
use temper_contracts::{
    agent::{Phase, TaskId},
    debug::DebugSession,
    error::TemperResult,
    record::DecisionKind,
    refinement::LoopOutcome,
    verify::ArtifactType,
};
use temper_core::{
    persist::load_debug_session,
    traits::{DecisionLog, StateStore},
    RefinementLoop, RefinementTask,
};
use temper_debug::AutoDebugLoop;
use temper_router::{AgentRegistry, Dispatcher, RoutedProducer, Router};
use temper_store::InMemoryStore;
use temper_verify::VerificationGate;

use crate::agents::CodeAgent;
use crate::mock_data::{reference_config, HeaderCheckRunner};

pub struct DebugRepairReport {
    pub outcome: LoopOutcome,
    pub session: Option<DebugSession>,
    pub debug_records: usize,
}

pub fn run() -> TemperResult<DebugRepairReport> {
    let config = reference_config()?;
    let log = InMemoryDecisionLog::new();
    let audit: Arc<dyn DecisionLog> = Arc::new(log.clone());
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());

    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(CodeAgent::new()));
    let producer = RoutedProducer::new(
        Router::new(config.routing_table(), audit.clone())?,
        Dispatcher::new(registry, audit.clone()),
        ArtifactType::Code,
    );
    let debugger = AutoDebugLoop::new(Arc::new(HeaderCheckRunner), store.clone(), audit.clone())
        .with_config(&config.debug);

    let refinement = RefinementLoop::new(
        Box::new(producer),
        Box::new(VerificationGate::new(config.weights, config.thresholds, audit.clone())),
        Box::new(Router::new(config.routing_table(), audit.clone())?),
        store.clone(),
        audit,
    )
    .with_debugger(Box::new(debugger));

    let task = RefinementTask::new(
        TaskId::generate(),
        Phase::Implementation,
        "Implement the add function with a test",
        ArtifactType::Code,
        config.loop_settings(Phase::Implementation),
    );
    let outcome = refinement.run(&task)?;

    let debug_records = log
        .history(&task.task_id)?
        .iter()
        .filter(|r| matches!(r.kind, DecisionKind::DebugAttempt { .. }))
        .count();
    Ok(DebugRepairReport {
        session: load_debug_session(store.as_ref(), &task.task_id)?,
        outcome,
        debug_records,
    })
}

pub fn run_scenario() -> TemperResult<()> {
    println!("=== Scenario 3: Debug and repair ===");
    println!();

    let report = run()?;
    if let Some(session) = &report.session {
        for attempt in session.attempts() {
            println!("  Attempt {}: {} error", attempt.attempt, attempt.error_pattern);
            println!("      error:  {}", attempt.error_message);
            println!("      repair: {}", attempt.repair_description);
            println!("      tests:  {:?}", attempt.test_outcome);
        }
        println!(
            "  Session: {} after {} attempt(s)",
            if session.success() { "resolved" } else { "escalated" },
            session.total_iterations()
        );
    }
    let state = report.outcome.state();
    if let Some(record) = state.records().last() {
        println!("  Gate quality after repair: {:.3}", record.quality_score);
    }
    println!("  Outcome: {:?} in round {}", report.outcome.status(), state.current_round());
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use temper_contracts::{debug::ErrorPattern, refinement::LoopStatus};

    use super::run;

    #[test]
    fn test_missing_colon_repaired_in_first_round() {
        let report = run().unwrap();

        // A perfect first round seeds the smoothed score at 1.0.
        assert_eq!(report.outcome.status(), LoopStatus::EarlyStopped);
        assert_eq!(report.outcome.state().current_round(), 1);

        let session = report.session.unwrap();
        assert!(session.success());
        assert_eq!(session.total_iterations(), 1);
        assert_eq!(session.attempts()[0].error_pattern, ErrorPattern::Syntax);
        assert!(session.attempts()[0].repair_description.contains("line 6"));
        assert!(session
            .final_artifact()
            .unwrap()
            .contains("    for a, b, total in [(1, 2, 3), (2, 2, 4)]:\n"));
        assert_eq!(report.debug_records, 1);
    }
}
