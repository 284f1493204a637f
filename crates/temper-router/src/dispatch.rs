//! Executes a `RoutingDecision` against registered agents.
//!
//! Sequential decisions run one agent at a time, each seeing the outputs
//! of the agents before it. Parallel and dag decisions run in waves on the
//! rayon pool: every agent in a wave sees the same context, and the wave is
//! joined before its outputs are appended and the next wave starts.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde_json::Value;
use tracing::{debug, info, warn};

use temper_contracts::{
    agent::{AgentContext, AgentId, AgentInput, AgentOutput, Phase, TaskId},
    error::{TemperError, TemperResult},
    record::{DecisionKind, DecisionRecord},
    routing::{ExecutionStrategy, RoutingDecision},
};
use temper_core::traits::{Agent, DecisionLog};

const COMPONENT: &str = "dispatcher";

/// Agents by id.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentId, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` under its own id, replacing any earlier one.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.id().clone(), agent);
    }

    pub fn get(&self, id: &AgentId) -> Option<&Arc<dyn Agent>> {
        self.agents.get(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

pub struct Dispatcher {
    registry: AgentRegistry,
    log: Arc<dyn DecisionLog>,
    /// `None` runs waves on the global rayon pool.
    pool: Option<ThreadPool>,
}

impl Dispatcher {
    pub fn new(registry: AgentRegistry, log: Arc<dyn DecisionLog>) -> Self {
        Self {
            registry,
            log,
            pool: None,
        }
    }

    /// Run waves on a dedicated pool of `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> TemperResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("temper-agent-{i}"))
            .build()
            .map_err(|e| TemperError::Config {
                reason: format!("failed to build agent pool: {e}"),
            })?;
        self.pool = Some(pool);
        Ok(self)
    }

    /// Run every selected agent and append their outputs to `context`.
    ///
    /// Returns the outputs in the order they were appended.
    ///
    /// # Errors
    ///
    /// `Config` for an agent missing from the registry; `AgentFailed` when
    /// an agent errors or reports failure (outputs of the wave are still
    /// appended); `InputContract` for an output that breaks the contract.
    pub fn dispatch(
        &self,
        decision: &RoutingDecision,
        phase: Phase,
        payload: &Value,
        context: &mut AgentContext,
    ) -> TemperResult<Vec<AgentOutput>> {
        decision.validate()?;
        for id in &decision.selected_agents {
            if self.registry.get(id).is_none() {
                return Err(TemperError::Config {
                    reason: format!("agent '{id}' is routed but not registered"),
                });
            }
        }

        let waves: Vec<Vec<AgentId>> = match (&decision.execution_strategy, &decision.dependency_graph) {
            (ExecutionStrategy::Sequential, _) => {
                decision.selected_agents.iter().map(|a| vec![a.clone()]).collect()
            }
            (ExecutionStrategy::Dag, Some(graph)) => graph.waves()?,
            _ => vec![decision.selected_agents.clone()],
        };

        let mut produced = Vec::new();
        for (index, wave) in waves.iter().enumerate() {
            debug!(
                task_id = %decision.task_id,
                wave = index + 1,
                agents = ?wave,
                "dispatching wave"
            );
            let outputs = self.run_wave(&decision.task_id, wave, phase, payload, context)?;
            produced.extend(outputs);
        }
        info!(
            task_id = %decision.task_id,
            waves = waves.len(),
            outputs = produced.len(),
            "dispatch complete"
        );
        Ok(produced)
    }

    fn run_wave(
        &self,
        task_id: &TaskId,
        wave: &[AgentId],
        phase: Phase,
        payload: &Value,
        context: &mut AgentContext,
    ) -> TemperResult<Vec<AgentOutput>> {
        let inputs = wave
            .iter()
            .map(|id| AgentInput::new(id.clone(), task_id.clone(), phase, payload.clone(), context.clone()))
            .collect::<TemperResult<Vec<_>>>()?;

        // Join barrier: collect waits for every agent in the wave.
        let invoke_all = || -> Vec<(AgentInput, TemperResult<AgentOutput>)> {
            inputs
                .into_par_iter()
                .map(|input| {
                    let result = match self.registry.get(input.agent_id()) {
                        Some(agent) => agent.invoke(&input),
                        None => Err(TemperError::Config {
                            reason: format!("agent '{}' is not registered", input.agent_id()),
                        }),
                    };
                    (input, result)
                })
                .collect()
        };
        let results = match &self.pool {
            Some(pool) => pool.install(invoke_all),
            None => invoke_all(),
        };

        let mut outputs = Vec::new();
        let mut first_error = None;
        for (input, result) in results {
            match result.and_then(|output| {
                output.validate()?;
                output.ensure_answers(&input)?;
                Ok(output)
            }) {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    warn!(task_id = %task_id, agent = %input.agent_id(), error = %e, "agent invocation failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        outputs.sort_by_key(|o| o.created_at());
        for output in &outputs {
            self.log.append(&DecisionRecord::new(
                task_id.clone(),
                COMPONENT,
                DecisionKind::AgentOutput {
                    output: output.clone(),
                },
            ))?;
            context.record_output(output.clone())?;
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if let Some(failed) = outputs.iter().find(|o| !o.success()) {
            return Err(TemperError::AgentFailed {
                agent_id: failed.agent_id().to_string(),
                reason: failed.rationale().to_string(),
            });
        }
        Ok(outputs)
    }
}
