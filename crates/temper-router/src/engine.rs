//! The router.
//!
//! Routing algorithm:
//!
//! 1. Walk the table in declaration order and select every route that
//!    matches the request (`table::match_route`), skipping agents that
//!    already completed.
//! 2. Add an edge B → A whenever A requires a capability that B provides.
//! 3. Any edge makes the decision `dag` (the graph must be acyclic);
//!    otherwise two or more parallel-safe agents run `parallel`; anything
//!    else runs `sequential`.
//!
//! Every decision is validated, traced, and appended to the decision log.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use temper_contracts::{
    agent::{AgentId, TaskId},
    error::{TemperError, TemperResult},
    record::{DecisionKind, DecisionRecord},
    routing::{
        DependencyGraph, ExecutionStrategy, FailureSignal, RefinementStrategy, RouteEntry,
        RoutingDecision, RoutingRequest, RoutingTable, StrategyChoice, StrategyRecommendation,
    },
};
use temper_core::traits::{DecisionLog, StrategySelector};

use crate::strategy::select_strategy;
use crate::table::{match_route, table_from_file, table_from_toml_str, RouteMatch};

const COMPONENT: &str = "router";

pub struct Router {
    table: RoutingTable,
    log: Arc<dyn DecisionLog>,
}

impl Router {
    pub fn new(table: RoutingTable, log: Arc<dyn DecisionLog>) -> TemperResult<Self> {
        table.validate()?;
        Ok(Self { table, log })
    }

    pub fn from_toml_str(s: &str, log: Arc<dyn DecisionLog>) -> TemperResult<Self> {
        Self::new(table_from_toml_str(s)?, log)
    }

    pub fn from_file(path: &Path, log: Arc<dyn DecisionLog>) -> TemperResult<Self> {
        Self::new(table_from_file(path)?, log)
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Pick the agents for `request` and how to run them.
    ///
    /// # Errors
    ///
    /// `Config` when no route matches or the capability edges form a cycle;
    /// `AuditWriteFailed` when the decision cannot be logged.
    pub fn route(&self, request: &RoutingRequest) -> TemperResult<RoutingDecision> {
        self.decide(request, None)
    }

    /// Route again with the recovery strategy attached to the decision.
    pub fn reroute(
        &self,
        request: &RoutingRequest,
        strategy: RefinementStrategy,
    ) -> TemperResult<RoutingDecision> {
        self.decide(request, Some(strategy))
    }

    fn decide(
        &self,
        request: &RoutingRequest,
        refinement_strategy: Option<RefinementStrategy>,
    ) -> TemperResult<RoutingDecision> {
        let mut selected: Vec<(&RouteEntry, RouteMatch)> = Vec::new();
        for route in &self.table.routes {
            if request.completed.contains(&route.agent) {
                debug!(task_id = %request.task_id, agent = %route.agent, "skipping completed agent");
                continue;
            }
            if let Some(reason) = match_route(route, request) {
                selected.push((route, reason));
            }
        }

        if selected.is_empty() {
            warn!(
                task_id = %request.task_id,
                domains = ?request.detected_domains,
                "no route matches the task"
            );
            return Err(TemperError::Config {
                reason: format!(
                    "no route matches task '{}' (domains: {:?})",
                    request.task_id, request.detected_domains
                ),
            });
        }

        let mut graph = DependencyGraph::new();
        for (route, _) in &selected {
            graph.add_node(route.agent.clone());
        }
        let mut edges: Vec<String> = Vec::new();
        for (consumer, _) in &selected {
            for (provider, _) in &selected {
                if consumer.agent != provider.agent && consumer.requires.intersects(&provider.provides)
                {
                    graph.add_dependency(consumer.agent.clone(), provider.agent.clone());
                    edges.push(format!("{} -> {}", provider.agent, consumer.agent));
                }
            }
        }

        let matched: Vec<String> = selected.iter().map(|(r, m)| m.describe(r)).collect();
        let (execution_strategy, selected_agents, dependency_graph, why) = if graph.has_edges() {
            let order: Vec<AgentId> = graph.waves()?.into_iter().flatten().collect();
            (
                ExecutionStrategy::Dag,
                order,
                Some(graph),
                format!("capability dependencies {}", edges.join(", ")),
            )
        } else {
            let agents: Vec<AgentId> = selected.iter().map(|(r, _)| r.agent.clone()).collect();
            if agents.len() >= 2 && selected.iter().all(|(r, _)| r.parallel_safe) {
                (
                    ExecutionStrategy::Parallel,
                    agents,
                    None,
                    "independent parallel-safe agents".to_string(),
                )
            } else {
                (
                    ExecutionStrategy::Sequential,
                    agents,
                    None,
                    "a single agent or an agent that must run alone".to_string(),
                )
            }
        };

        let retried = selected
            .iter()
            .filter(|(r, _)| request.failed.contains(&r.agent))
            .count();
        let keyword_only = selected
            .iter()
            .filter(|(_, m)| matches!(m, RouteMatch::Keyword(_)))
            .count();
        let confidence =
            (0.95 - 0.1 * keyword_only as f64 / selected.len() as f64 - 0.1 * retried as f64)
                .clamp(0.1, 1.0);

        let decision = RoutingDecision {
            task_id: request.task_id.clone(),
            selected_agents,
            execution_strategy,
            dependency_graph,
            refinement_strategy,
            rationale: format!("selected {}; {why}", matched.join(", ")),
            confidence,
        };
        decision.validate()?;

        self.log.append(&DecisionRecord::new(
            request.task_id.clone(),
            COMPONENT,
            DecisionKind::Routing {
                decision: decision.clone(),
            },
        ))?;
        info!(
            task_id = %request.task_id,
            agents = ?decision.selected_agents,
            strategy = ?decision.execution_strategy,
            confidence = decision.confidence,
            refinement = ?decision.refinement_strategy.as_ref().map(|s| s.name()),
            "task routed"
        );
        Ok(decision)
    }

    /// Choose how to recover from a failed round. See `strategy`.
    pub fn select_strategy(
        &self,
        task_id: &TaskId,
        signal: &FailureSignal,
        recommendations: &[StrategyRecommendation],
    ) -> TemperResult<StrategyChoice> {
        let choice = select_strategy(signal, recommendations)?;
        info!(
            task_id = %task_id,
            strategy = choice.strategy.name(),
            fit = choice.fit,
            rationale = %choice.rationale,
            "refinement strategy chosen"
        );
        Ok(choice)
    }
}

/// The refinement loop records the returned choice itself.
impl StrategySelector for Router {
    fn select(
        &self,
        task_id: &TaskId,
        signal: &FailureSignal,
        recommendations: &[StrategyRecommendation],
    ) -> TemperResult<StrategyChoice> {
        self.select_strategy(task_id, signal, recommendations)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use temper_audit::InMemoryDecisionLog;
    use temper_contracts::{
        agent::{AgentId, TaskId},
        error::TemperError,
        record::DecisionKind,
        routing::{ExecutionStrategy, RoutingRequest},
    };
    use temper_core::traits::DecisionLog;

    use super::Router;

    const TABLE: &str = r#"
        [[routes]]
        agent = "backend-agent"
        domain = "backend"
        keywords = ["api", "endpoint"]
        provides = ["api:contract"]

        [[routes]]
        agent = "frontend-agent"
        domain = "frontend"
        keywords = ["page", "form"]
        requires = ["api:contract"]

        [[routes]]
        agent = "docs-agent"
        domain = "docs"
        keywords = ["readme"]

        [[routes]]
        agent = "migration-agent"
        domain = "database"
        keywords = ["migration"]
        parallel_safe = false
    "#;

    fn router() -> (Router, Arc<InMemoryDecisionLog>) {
        let log = Arc::new(InMemoryDecisionLog::new());
        (Router::from_toml_str(TABLE, log.clone()).unwrap(), log)
    }

    fn request(description: &str, domains: &[&str]) -> RoutingRequest {
        RoutingRequest {
            task_id: TaskId::new("task-route"),
            task_description: description.to_string(),
            detected_domains: domains.iter().map(|d| d.to_string()).collect(),
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
        }
    }

    #[test]
    fn test_backend_and_frontend_route_as_dag() {
        let (router, log) = router();
        let decision = router
            .route(&request("Build a login page backed by a new API", &["backend", "frontend"]))
            .unwrap();

        assert_eq!(decision.execution_strategy, ExecutionStrategy::Dag);
        assert_eq!(
            decision.selected_agents,
            vec![AgentId::new("backend-agent"), AgentId::new("frontend-agent")]
        );
        let graph = decision.dependency_graph.as_ref().unwrap();
        assert!(graph
            .dependencies_of(&AgentId::new("frontend-agent"))
            .unwrap()
            .contains(&AgentId::new("backend-agent")));
        assert!(decision.rationale.contains("backend-agent -> frontend-agent"));

        let history = log.history(&TaskId::new("task-route")).unwrap();
        assert_eq!(history.len(), 1);
        assert!(matches!(history[0].kind, DecisionKind::Routing { .. }));
    }

    #[test]
    fn test_independent_agents_run_parallel() {
        let (router, _) = router();
        let decision = router
            .route(&request("Add an endpoint and update the readme", &[]))
            .unwrap();
        assert_eq!(decision.execution_strategy, ExecutionStrategy::Parallel);
        assert_eq!(decision.selected_agents.len(), 2);
        assert!(decision.dependency_graph.is_none());
    }

    #[test]
    fn test_unsafe_or_single_agent_runs_sequential() {
        let (router, _) = router();
        let single = router.route(&request("Fix the readme", &[])).unwrap();
        assert_eq!(single.execution_strategy, ExecutionStrategy::Sequential);

        let exclusive = router
            .route(&request("Write a migration and update the readme", &[]))
            .unwrap();
        assert_eq!(exclusive.execution_strategy, ExecutionStrategy::Sequential);
    }

    #[test]
    fn test_completed_agents_are_skipped() {
        let (router, _) = router();
        let mut req = request("Build a login page backed by a new API", &["backend", "frontend"]);
        req.completed.insert(AgentId::new("backend-agent"));

        let decision = router.route(&req).unwrap();
        assert_eq!(decision.selected_agents, vec![AgentId::new("frontend-agent")]);
        assert_eq!(decision.execution_strategy, ExecutionStrategy::Sequential);
    }

    #[test]
    fn test_retried_agents_lower_confidence() {
        let (router, _) = router();
        let fresh = router.route(&request("x", &["docs"])).unwrap();
        let mut req = request("x", &["docs"]);
        req.failed.insert(AgentId::new("docs-agent"));
        let retry = router.route(&req).unwrap();
        assert!(retry.confidence < fresh.confidence);
    }

    #[test]
    fn test_capability_cycle_is_config_error() {
        let log = Arc::new(InMemoryDecisionLog::new());
        let router = Router::from_toml_str(
            r#"
            [[routes]]
            agent = "a"
            domain = "x"
            provides = ["one"]
            requires = ["two"]

            [[routes]]
            agent = "b"
            domain = "x"
            provides = ["two"]
            requires = ["one"]
            "#,
            log.clone(),
        )
        .unwrap();

        let err = router.route(&request("anything", &["x"])).unwrap_err();
        assert!(err.to_string().contains("dependency cycle"));
        assert!(log.history(&TaskId::new("task-route")).unwrap().is_empty());
    }

    #[test]
    fn test_unroutable_task_is_config_error() {
        let (router, _) = router();
        let err = router.route(&request("paint the fence", &[])).unwrap_err();
        assert!(matches!(err, TemperError::Config { .. }));
    }
}
