//! Router plus dispatcher as a refinement-loop `Producer`.
//!
//! Each round the task is routed, the selected agents run, and their
//! outputs are assembled into one artifact. An output whose payload carries
//! an `execution_failure` object turns the round into an execution failure
//! for the debug loop.
//!
//! The producer keeps one `AgentContext` per refinement state, so agents in
//! round N see every output of rounds 1..N. Agents that failed a dispatch are
//! handed to the router as failed until they succeed again.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde_json::json;
use tracing::debug;

use temper_contracts::{
    agent::{AgentContext, AgentId, AgentOutput, StateRef},
    debug::ExecutionFailure,
    error::{TemperError, TemperResult},
    routing::RoutingRequest,
    verify::{Artifact, ArtifactType},
};
use temper_core::traits::{ProduceRequest, Produced, Producer};

use crate::dispatch::Dispatcher;
use crate::engine::Router;

/// What the producer remembers about one refinement state between rounds.
#[derive(Default)]
struct Session {
    context: AgentContext,
    failed: BTreeSet<AgentId>,
}

pub struct RoutedProducer {
    router: Router,
    dispatcher: Dispatcher,
    artifact_type: ArtifactType,
    detected_domains: Vec<String>,
    sessions: Mutex<HashMap<StateRef, Session>>,
}

impl RoutedProducer {
    pub fn new(router: Router, dispatcher: Dispatcher, artifact_type: ArtifactType) -> Self {
        Self {
            router,
            dispatcher,
            artifact_type,
            detected_domains: Vec::new(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.detected_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// The context accumulated for `state` so far.
    pub fn context_of(&self, state: &StateRef) -> TemperResult<Option<AgentContext>> {
        Ok(self.sessions()?.get(state).map(|s| s.context.clone()))
    }

    fn sessions(&self) -> TemperResult<MutexGuard<'_, HashMap<StateRef, Session>>> {
        self.sessions.lock().map_err(|e| TemperError::Store {
            reason: format!("producer session lock poisoned: {e}"),
        })
    }
}

fn execution_failure(output: &AgentOutput) -> TemperResult<Option<ExecutionFailure>> {
    output
        .payload()
        .get("execution_failure")
        .map(|v| {
            serde_json::from_value(v.clone()).map_err(|e| TemperError::InputContract {
                reason: format!(
                    "agent '{}' reported a malformed execution failure: {e}",
                    output.agent_id()
                ),
            })
        })
        .transpose()
}

impl Producer for RoutedProducer {
    fn produce(&self, request: &ProduceRequest) -> TemperResult<Produced> {
        let (mut context, failed) = {
            let mut sessions = self.sessions()?;
            let session = sessions.entry(request.state.clone()).or_default();
            (session.context.clone(), session.failed.clone())
        };

        // Every round reworks the whole artifact, so no agent is ever
        // treated as completed here.
        let routing = RoutingRequest {
            task_id: request.task_id.clone(),
            task_description: request.description.clone(),
            detected_domains: self.detected_domains.clone(),
            completed: BTreeSet::new(),
            failed,
        };
        let decision = match &request.strategy {
            Some(strategy) => self.router.reroute(&routing, strategy.clone())?,
            None => self.router.route(&routing)?,
        };

        context.attach_refinement(request.state.clone())?;
        let seen = context.feedback().len();
        context.add_feedback(request.feedback.iter().skip(seen).cloned());
        let payload = json!({
            "description": request.description,
            "round": request.round,
            "base_artifact": request.base_artifact,
            "added_steps": request.added_steps,
            "strategy": request.strategy.as_ref().map(|s| s.name()),
        });
        let dispatched = self
            .dispatcher
            .dispatch(&decision, request.phase, &payload, &mut context);
        {
            let mut sessions = self.sessions()?;
            let session = sessions.entry(request.state.clone()).or_default();
            session.context = context;
            match &dispatched {
                Ok(outputs) => {
                    for output in outputs {
                        session.failed.remove(output.agent_id());
                    }
                }
                Err(TemperError::AgentFailed { agent_id, .. }) => {
                    session.failed.insert(AgentId::new(agent_id.clone()));
                }
                Err(_) => {}
            }
        }
        let outputs = dispatched?;

        for output in &outputs {
            if let Some(failure) = execution_failure(output)? {
                debug!(task_id = %request.task_id, agent = %output.agent_id(), "agent reported an execution failure");
                return Ok(Produced::failure(failure, decision.selected_agents.clone()));
            }
        }

        let parts: Vec<&str> = outputs
            .iter()
            .filter_map(|o| o.payload().get("artifact").and_then(|a| a.as_str()))
            .collect();
        if parts.is_empty() {
            return Err(TemperError::AgentFailed {
                agent_id: decision
                    .selected_agents
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                reason: "no agent returned an artifact".to_string(),
            });
        }
        Ok(Produced::artifact(
            Artifact::inline(self.artifact_type, parts.join("\n\n")),
            decision.selected_agents,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use temper_audit::InMemoryDecisionLog;
    use temper_contracts::{
        agent::{AgentId, AgentInput, AgentOutput, Phase, StateRef, TaskId},
        error::{TemperError, TemperResult},
        record::DecisionKind,
        routing::RefinementStrategy,
        verify::{ArtifactRef, ArtifactType},
    };
    use temper_core::traits::{Agent, DecisionLog, ProduceRequest, Producer, ProducerOutcome};

    use crate::dispatch::{AgentRegistry, Dispatcher};
    use crate::engine::Router;

    use super::RoutedProducer;

    struct SectionAgent {
        id: AgentId,
        section: &'static str,
    }

    impl Agent for SectionAgent {
        fn id(&self) -> &AgentId {
            &self.id
        }

        fn invoke(&self, input: &AgentInput) -> TemperResult<AgentOutput> {
            let feedback = input.context().feedback().len();
            assert_eq!(input.context().refinement().map(|r| r.phase), Some(Phase::Specification));
            AgentOutput::new(
                self.id.clone(),
                input.task_id().clone(),
                true,
                json!({ "artifact": format!("## {}\nfeedback items: {feedback}", self.section) }),
                "wrote section",
                0.8,
                vec![],
            )
        }
    }

    struct CrashingAgent(AgentId);

    impl Agent for CrashingAgent {
        fn id(&self) -> &AgentId {
            &self.0
        }

        fn invoke(&self, input: &AgentInput) -> TemperResult<AgentOutput> {
            AgentOutput::new(
                self.0.clone(),
                input.task_id().clone(),
                true,
                json!({ "execution_failure": {
                    "artifact": "print(x",
                    "error_message": "SyntaxError: '(' was never closed",
                    "stack_trace": "File \"main.py\", line 1",
                }}),
                "ran the code",
                0.5,
                vec![],
            )
        }
    }

    /// Records the history length it sees; fails while `failures` is above 0.
    struct DraftAgent {
        id: AgentId,
        seen: Arc<Mutex<Vec<usize>>>,
        failures: Mutex<u32>,
    }

    impl Agent for DraftAgent {
        fn id(&self) -> &AgentId {
            &self.id
        }

        fn invoke(&self, input: &AgentInput) -> TemperResult<AgentOutput> {
            self.seen.lock().unwrap().push(input.context().history().len());
            let mut failures = self.failures.lock().unwrap();
            let success = *failures == 0;
            *failures = failures.saturating_sub(1);
            AgentOutput::new(
                self.id.clone(),
                input.task_id().clone(),
                success,
                json!({ "artifact": "## Draft" }),
                if success { "drafted" } else { "model timed out" },
                0.7,
                vec![],
            )
        }
    }

    fn draft_producer(failures: u32, log: InMemoryDecisionLog) -> (RoutedProducer, Arc<Mutex<Vec<usize>>>) {
        let log = Arc::new(log);
        let seen = Arc::new(Mutex::new(vec![]));
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(DraftAgent {
            id: AgentId::new("drafter"),
            seen: seen.clone(),
            failures: Mutex::new(failures),
        }));
        let table = "[[routes]]\nagent = \"drafter\"\ndomain = \"spec\"";
        let producer = RoutedProducer::new(
            Router::from_toml_str(table, log.clone()).unwrap(),
            Dispatcher::new(registry, log),
            ArtifactType::Specification,
        )
        .with_domains(["spec"]);
        (producer, seen)
    }

    fn confidences(log: &InMemoryDecisionLog, task_id: &TaskId) -> Vec<f64> {
        log.history(task_id)
            .unwrap()
            .into_iter()
            .filter_map(|r| match r.kind {
                DecisionKind::Routing { decision } => Some(decision.confidence),
                _ => None,
            })
            .collect()
    }

    const TABLE: &str = r#"
        [[routes]]
        agent = "overview-writer"
        domain = "spec"
        provides = ["spec:overview"]

        [[routes]]
        agent = "requirements-writer"
        domain = "spec"
        requires = ["spec:overview"]

        [[routes]]
        agent = "runner"
        domain = "code"
    "#;

    fn producer(domains: &[&str]) -> RoutedProducer {
        producer_with_log(domains, InMemoryDecisionLog::new())
    }

    fn producer_with_log(domains: &[&str], log: InMemoryDecisionLog) -> RoutedProducer {
        let log = Arc::new(log);
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(SectionAgent {
            id: AgentId::new("overview-writer"),
            section: "Overview",
        }));
        registry.register(Arc::new(SectionAgent {
            id: AgentId::new("requirements-writer"),
            section: "Requirements",
        }));
        registry.register(Arc::new(CrashingAgent(AgentId::new("runner"))));
        RoutedProducer::new(
            Router::from_toml_str(TABLE, log.clone()).unwrap(),
            Dispatcher::new(registry, log),
            ArtifactType::Specification,
        )
        .with_domains(domains.iter().copied())
    }

    fn request() -> ProduceRequest {
        ProduceRequest {
            task_id: TaskId::new("task-produce"),
            phase: Phase::Specification,
            description: "write the login spec".to_string(),
            round: 2,
            feedback: vec!["add a Requirements section".to_string()],
            base_artifact: None,
            added_steps: vec![],
            strategy: None,
            state: StateRef {
                task_id: TaskId::new("task-produce"),
                phase: Phase::Specification,
            },
        }
    }

    #[test]
    fn test_outputs_assembled_in_dependency_order() {
        let produced = producer(&["spec"]).produce(&request()).unwrap();

        assert_eq!(produced.agents_invoked.len(), 2);
        let ProducerOutcome::Artifact { artifact } = produced.outcome else {
            panic!("expected an artifact");
        };
        let ArtifactRef::Inline { content } = artifact.reference else {
            panic!("expected inline content");
        };
        let overview = content.find("## Overview").unwrap();
        let requirements = content.find("## Requirements").unwrap();
        assert!(overview < requirements);
        assert!(content.contains("feedback items: 1"));
    }

    #[test]
    fn test_reported_failure_becomes_execution_failure() {
        let produced = producer(&["code"]).produce(&request()).unwrap();
        let ProducerOutcome::ExecutionFailure { failure } = produced.outcome else {
            panic!("expected an execution failure");
        };
        assert!(failure.error_message.contains("never closed"));
    }

    #[test]
    fn test_chosen_strategy_travels_with_the_route() {
        let log = InMemoryDecisionLog::new();
        let mut request = request();
        request.strategy = Some(RefinementStrategy::RetryWithFeedback);

        producer_with_log(&["spec"], log.clone()).produce(&request).unwrap();

        let routed = log
            .history(&request.task_id)
            .unwrap()
            .into_iter()
            .find_map(|r| match r.kind {
                DecisionKind::Routing { decision } => Some(decision),
                _ => None,
            })
            .unwrap();
        assert_eq!(routed.refinement_strategy, Some(RefinementStrategy::RetryWithFeedback));
    }

    #[test]
    fn test_context_grows_across_rounds() {
        let (producer, seen) = draft_producer(0, InMemoryDecisionLog::new());
        let mut request = request();

        for round in 1..=3 {
            request.round = round;
            request.feedback = (1..round).map(|i| format!("issue {i}")).collect();
            producer.produce(&request).unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        let context = producer.context_of(&request.state).unwrap().unwrap();
        assert_eq!(context.history().len(), 3);
        assert_eq!(context.feedback(), &["issue 1".to_string(), "issue 2".to_string()]);
    }

    #[test]
    fn test_failed_agent_is_routed_as_retried() {
        let log = InMemoryDecisionLog::new();
        let (producer, _) = draft_producer(1, log.clone());
        let request = request();

        let first = producer.produce(&request);
        assert!(matches!(first, Err(TemperError::AgentFailed { .. })));
        producer.produce(&request).unwrap();
        producer.produce(&request).unwrap();

        let confidences = confidences(&log, &request.task_id);
        assert_eq!(confidences.len(), 3);
        assert!(confidences[1] < confidences[0]);
        assert_eq!(confidences[2], confidences[0]);
        let context = producer.context_of(&request.state).unwrap().unwrap();
        assert!(!context.history()[0].success());
    }
}
