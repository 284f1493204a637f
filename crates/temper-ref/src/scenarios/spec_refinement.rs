//! Scenario 1: Specification refinement
//!
//! A spec writer drafts a login specification. The first draft has only
//! an overview and success criteria; the gate scores it well below the
//! threshold and says which sections are missing. The router picks the
//! next strategy, the feedback reaches the writer through its context,
//! and the second draft passes.
//!
//!   Round 1: route → spec-writer → gate (insufficient) → strategy
//!   Round 2: route → spec-writer (with feedback) → gate (sufficient)

use std::sync::Arc;

use temper_audit::InMemoryDecisionLog;
use temper_contracts::{
    agent::{Phase, TaskId},
    error::TemperResult,
    refinement::LoopOutcome,
    verify::ArtifactType,
};
use temper_core::{traits::DecisionLog, RefinementLoop, RefinementTask};
use temper_router::{AgentRegistry, Dispatcher, RoutedProducer, Router};
use temper_store::InMemoryStore;
use temper_verify::VerificationGate;

use crate::agents::SpecWriterAgent;
use crate::mock_data::reference_config;

pub struct SpecRefinementReport {
    pub outcome: LoopOutcome,
    pub audit_events: usize,
    pub chain_intact: bool,
}

pub fn run() -> TemperResult<SpecRefinementReport> {
    let config = reference_config()?;
    let log = InMemoryDecisionLog::new();
    let audit: Arc<dyn DecisionLog> = Arc::new(log.clone());
    let store = Arc::new(InMemoryStore::new());

    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(SpecWriterAgent::new()));
    let producer = RoutedProducer::new(
        Router::new(config.routing_table(), audit.clone())?,
        Dispatcher::new(registry, audit.clone()),
        ArtifactType::Specification,
    )
    .with_domains(["specification"]);
    let gate = VerificationGate::new(config.weights, config.thresholds, audit.clone());
    let selector = Router::new(config.routing_table(), audit.clone())?;

    let refinement = RefinementLoop::new(
        Box::new(producer),
        Box::new(gate),
        Box::new(selector),
        store,
        audit,
    );
    let task = RefinementTask::new(
        TaskId::generate(),
        Phase::Specification,
        "Write the login specification",
        ArtifactType::Specification,
        config.loop_settings(Phase::Specification),
    );
    let outcome = refinement.run(&task)?;

    Ok(SpecRefinementReport {
        audit_events: log.export_trail(&task.task_id)?.events.len(),
        chain_intact: log.verify_integrity(&task.task_id)?,
        outcome,
    })
}

pub fn run_scenario() -> TemperResult<()> {
    println!("=== Scenario 1: Specification refinement ===");
    println!();

    let report = run()?;
    let state = report.outcome.state();
    for record in state.records() {
        println!(
            "  Round {}: quality {:.3}  ema {:.3}  {:?}",
            record.round, record.quality_score, record.ema_quality, record.decision.decision
        );
        for item in record.decision.feedback.iter().take(4) {
            println!("      feedback: {item}");
        }
        if let Some(strategy) = &record.next_strategy {
            println!("      next strategy: {}", strategy.name());
        }
    }
    println!();
    println!("  Outcome:            {:?}", report.outcome.status());
    println!("  Audit events:       {}", report.audit_events);
    println!("  Audit chain intact: {}", report.chain_intact);
    println!();
    Ok(())
}
