//! Scenario 2: Feature routing
//!
//! One feature request touches three domains. The backend agent provides
//! the API contract the frontend agent requires, so the router builds a
//! dependency graph and the dispatcher runs it in waves:
//!
//!   wave 1: backend-agent, docs-agent   (in parallel)
//!   wave 2: frontend-agent              (after the join barrier)
//!
//! A second request naming only independent domains runs fully parallel.

use std::sync::Arc;

use serde_json::json;

use temper_audit::InMemoryDecisionLog;
use temper_contracts::{
    agent::{AgentContext, AgentOutput, Phase, TaskId},
    error::TemperResult,
    routing::{RoutingDecision, RoutingRequest},
};
use temper_core::traits::DecisionLog;
use temper_router::{AgentRegistry, Dispatcher, Router};

use crate::agents::FeatureAgent;
use crate::mock_data::reference_config;

pub struct FeatureRoutingReport {
    pub decision: RoutingDecision,
    pub waves: Vec<Vec<String>>,
    pub outputs: Vec<AgentOutput>,
    pub independent: RoutingDecision,
}

fn registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(FeatureAgent::new("backend-agent", "POST /login endpoint and session API contract")));
    registry.register(Arc::new(FeatureAgent::new("frontend-agent", "login form wired to the session API")));
    registry.register(Arc::new(FeatureAgent::new("docs-agent", "changelog entry for the login flow")));
    registry
}

fn request(task_id: &TaskId, description: &str, domains: &[&str]) -> RoutingRequest {
    RoutingRequest {
        task_id: task_id.clone(),
        task_description: description.to_string(),
        detected_domains: domains.iter().map(|d| d.to_string()).collect(),
        completed: Default::default(),
        failed: Default::default(),
    }
}

pub fn run() -> TemperResult<FeatureRoutingReport> {
    let config = reference_config()?;
    let audit: Arc<dyn DecisionLog> = Arc::new(InMemoryDecisionLog::new());
    let router = Router::new(config.routing_table(), audit.clone())?;
    let dispatcher = Dispatcher::new(registry(), audit).with_threads(4)?;

    let task_id = TaskId::generate();
    let decision = router.route(&request(
        &task_id,
        "Add a login page backed by a new session api endpoint",
        &["backend", "frontend", "docs"],
    ))?;
    let waves = match &decision.dependency_graph {
        Some(graph) => graph
            .waves()?
            .into_iter()
            .map(|wave| wave.into_iter().map(|a| a.to_string()).collect())
            .collect(),
        None => vec![decision.selected_agents.iter().map(|a| a.to_string()).collect()],
    };

    let mut context = AgentContext::new();
    let outputs = dispatcher.dispatch(
        &decision,
        Phase::Implementation,
        &json!({ "description": "login feature" }),
        &mut context,
    )?;

    let independent = router.route(&request(
        &TaskId::generate(),
        "Refresh the readme and polish the settings page",
        &[],
    ))?;

    Ok(FeatureRoutingReport {
        decision,
        waves,
        outputs,
        independent,
    })
}

pub fn run_scenario() -> TemperResult<()> {
    println!("=== Scenario 2: Feature routing ===");
    println!();

    let report = run()?;
    println!("  Strategy:   {:?}", report.decision.execution_strategy);
    println!("  Confidence: {:.2}", report.decision.confidence);
    println!("  Rationale:  {}", report.decision.rationale);
    for (index, wave) in report.waves.iter().enumerate() {
        println!("  Wave {}: {}", index + 1, wave.join(", "));
    }
    println!();
    for output in &report.outputs {
        println!(
            "  {:<15} saw upstream: {}",
            output.agent_id().to_string(),
            output.payload()["saw"]
        );
    }
    println!();
    println!(
        "  Independent request: {:?} over {:?}",
        report.independent.execution_strategy,
        report
            .independent
            .selected_agents
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
    );
    println!();
    Ok(())
}
