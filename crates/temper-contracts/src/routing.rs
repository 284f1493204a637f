//! Routing table, routing decisions, and refinement strategies.
//!
//! The router consumes a `RoutingRequest` plus a `RoutingTable` and emits a
//! `RoutingDecision`. When a round fails it additionally consumes a
//! `FailureSignal` and picks a `RefinementStrategy`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    agent::{AgentId, TaskId},
    capability::CapabilitySet,
    debug::ExecutionFailure,
    error::{TemperError, TemperResult},
    verify::{Decision, VerificationDecision},
};

/// One row of the domain → agent dispatch table.
///
/// Example in TOML:
/// ```toml
/// [[routes]]
/// agent = "backend-agent"
/// domain = "backend"
/// keywords = ["api", "endpoint", "database"]
/// provides = ["api:contract"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub agent: AgentId,
    pub domain: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Capabilities this agent's output makes available to others.
    #[serde(default)]
    pub provides: CapabilitySet,
    /// Capabilities that must be produced before this agent can run.
    #[serde(default)]
    pub requires: CapabilitySet,
    /// False when the agent touches shared resources and must run alone.
    #[serde(default = "default_true")]
    pub parallel_safe: bool,
}

fn default_true() -> bool {
    true
}

/// The full dispatch table, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

impl RoutingTable {
    /// Every route needs a non-blank agent and domain, and no agent may be
    /// routed twice.
    pub fn validate(&self) -> TemperResult<()> {
        let mut seen = BTreeSet::new();
        for route in &self.routes {
            if route.agent.0.trim().is_empty() || route.domain.trim().is_empty() {
                return Err(TemperError::Config {
                    reason: "every route needs a non-empty agent and domain".to_string(),
                });
            }
            if !seen.insert(&route.agent) {
                return Err(TemperError::Config {
                    reason: format!("agent '{}' is routed twice", route.agent),
                });
            }
        }
        Ok(())
    }
}

/// What the router needs to pick the next agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub task_id: TaskId,
    pub task_description: String,
    /// Domains detected upstream (e.g. "backend", "frontend").
    #[serde(default)]
    pub detected_domains: Vec<String>,
    /// Agents that already completed for this task.
    #[serde(default)]
    pub completed: BTreeSet<AgentId>,
    /// Agents whose last run failed.
    #[serde(default)]
    pub failed: BTreeSet<AgentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
    Dag,
}

/// Node → the nodes it depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    edges: BTreeMap<AgentId, BTreeSet<AgentId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node with no dependencies (no-op if present).
    pub fn add_node(&mut self, node: AgentId) {
        self.edges.entry(node).or_default();
    }

    /// Record that `node` depends on `dependency`.
    pub fn add_dependency(&mut self, node: AgentId, dependency: AgentId) {
        self.edges.entry(dependency.clone()).or_default();
        self.edges.entry(node).or_default().insert(dependency);
    }

    pub fn dependencies_of(&self, node: &AgentId) -> Option<&BTreeSet<AgentId>> {
        self.edges.get(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AgentId> {
        self.edges.keys()
    }

    pub fn has_edges(&self) -> bool {
        self.edges.values().any(|deps| !deps.is_empty())
    }

    /// Group nodes into waves: every node's dependencies sit in earlier
    /// waves. Nodes within a wave are sorted by id.
    ///
    /// Returns `Config` error naming the stuck nodes when the graph has a
    /// cycle.
    pub fn waves(&self) -> TemperResult<Vec<Vec<AgentId>>> {
        let mut remaining: BTreeMap<&AgentId, BTreeSet<&AgentId>> = self
            .edges
            .iter()
            .map(|(node, deps)| (node, deps.iter().collect()))
            .collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<&AgentId> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(node, _)| *node)
                .collect();

            if ready.is_empty() {
                let stuck: Vec<String> = remaining.keys().map(|n| n.0.clone()).collect();
                return Err(TemperError::Config {
                    reason: format!("dependency cycle among agents: {}", stuck.join(", ")),
                });
            }

            for node in &ready {
                remaining.remove(node);
            }
            for deps in remaining.values_mut() {
                for node in &ready {
                    deps.remove(node);
                }
            }
            waves.push(ready.into_iter().cloned().collect());
        }

        Ok(waves)
    }
}

/// How to recover from a failed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum RefinementStrategy {
    /// Run the same step again with the accumulated feedback.
    RetryWithFeedback,
    /// A required check is missing entirely; add a step that produces it.
    AddStep { description: String },
    /// An earlier step invalidated later work; resume from round `index`.
    TruncateFrom { index: u32 },
    /// A runtime or test failure; hand off to the auto-debug loop.
    RouteToDebug,
}

impl RefinementStrategy {
    /// Position in the fixed cost order, cheapest first.
    pub fn cost_rank(&self) -> u8 {
        match self {
            RefinementStrategy::RetryWithFeedback => 0,
            RefinementStrategy::AddStep { .. } => 1,
            RefinementStrategy::TruncateFrom { .. } => 2,
            RefinementStrategy::RouteToDebug => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RefinementStrategy::RetryWithFeedback => "retry-with-feedback",
            RefinementStrategy::AddStep { .. } => "add-step",
            RefinementStrategy::TruncateFrom { .. } => "truncate-from",
            RefinementStrategy::RouteToDebug => "route-to-debug",
        }
    }
}

/// The router's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub task_id: TaskId,
    pub selected_agents: Vec<AgentId>,
    pub execution_strategy: ExecutionStrategy,
    /// Present iff `execution_strategy` is `Dag`.
    pub dependency_graph: Option<DependencyGraph>,
    pub refinement_strategy: Option<RefinementStrategy>,
    pub rationale: String,
    pub confidence: f64,
}

impl RoutingDecision {
    /// Check the structural invariants: a graph exactly when the strategy is
    /// dag, every graph node selected, and no cycles.
    pub fn validate(&self) -> TemperResult<()> {
        match (&self.execution_strategy, &self.dependency_graph) {
            (ExecutionStrategy::Dag, None) => {
                return Err(TemperError::Config {
                    reason: "dag strategy requires a dependency graph".to_string(),
                })
            }
            (ExecutionStrategy::Dag, Some(graph)) => {
                let selected: BTreeSet<&AgentId> = self.selected_agents.iter().collect();
                if let Some(stray) = graph.nodes().find(|n| !selected.contains(n)) {
                    return Err(TemperError::Config {
                        reason: format!("graph node '{stray}' is not a selected agent"),
                    });
                }
                graph.waves()?;
            }
            (_, Some(_)) => {
                return Err(TemperError::Config {
                    reason: "only the dag strategy carries a dependency graph".to_string(),
                })
            }
            (_, None) => {}
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(TemperError::Config {
                reason: format!("routing confidence {} outside [0, 1]", self.confidence),
            });
        }
        Ok(())
    }
}

/// Everything the router knows about why a round failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureSignal {
    pub quality_score: Option<f64>,
    pub threshold: Option<f64>,
    pub violated_checks: Vec<String>,
    /// Checks whose subject is absent altogether (e.g. a missing section).
    pub missing_checks: Vec<String>,
    /// Set when a later round found that round `n`'s output invalidated
    /// the work built on it.
    pub invalidated_round: Option<u32>,
    pub execution_failure: Option<ExecutionFailure>,
}

impl FailureSignal {
    /// Check ids using this prefix name something absent rather than wrong.
    pub const MISSING_PREFIX: &'static str = "missing-";

    /// Derive a signal from an insufficient gate decision.
    pub fn from_decision(decision: &VerificationDecision) -> Self {
        let missing_checks = decision
            .violated_checks
            .iter()
            .filter(|c| c.starts_with(Self::MISSING_PREFIX))
            .cloned()
            .collect();
        Self {
            quality_score: Some(decision.quality_score),
            threshold: Some(decision.threshold),
            violated_checks: if decision.decision == Decision::Insufficient {
                decision.violated_checks.clone()
            } else {
                Vec::new()
            },
            missing_checks,
            invalidated_round: None,
            execution_failure: None,
        }
    }

    pub fn from_execution_failure(failure: ExecutionFailure) -> Self {
        Self {
            execution_failure: Some(failure),
            ..Self::default()
        }
    }
}

/// A strategy suggested by some component other than the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecommendation {
    pub source: String,
    pub strategy: RefinementStrategy,
    /// How well the strategy fits, in [0, 1].
    pub fit: f64,
    pub rationale: String,
}

/// The strategy the router settled on, with its reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyChoice {
    pub strategy: RefinementStrategy,
    pub fit: f64,
    pub rationale: String,
}
