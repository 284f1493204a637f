//! Scripted sub-agents for the reference scenarios.
//!
//! Each agent answers deterministically from `mock_data`, so every
//! scenario is reproducible. They stand where an LLM-backed agent would.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use tracing::debug;

use temper_contracts::{
    agent::{AgentId, AgentInput, AgentOutput},
    debug::TestOutcome,
    error::TemperResult,
};
use temper_core::traits::Agent;
use temper_debug::TestRunner;

use crate::mock_data::{login_spec, HeaderCheckRunner, BROKEN_ADD, FIRST_DRAFT_SECTIONS, LOGIN_SPEC_SECTIONS};

static REQUESTED_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"add a '## ([^']+)' section").expect("valid regex"));

/// Drafts the login specification. The first draft is incomplete; every
/// section the gate asks for in feedback is added in the next round.
pub struct SpecWriterAgent {
    id: AgentId,
}

impl SpecWriterAgent {
    pub fn new() -> Self {
        Self {
            id: AgentId::new("spec-writer"),
        }
    }
}

impl Default for SpecWriterAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for SpecWriterAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn invoke(&self, input: &AgentInput) -> TemperResult<AgentOutput> {
        let mut sections: Vec<&str> = FIRST_DRAFT_SECTIONS.to_vec();
        for item in input.context().feedback() {
            for captures in REQUESTED_SECTION.captures_iter(item) {
                let requested = captures.get(1).map_or("", |m| m.as_str());
                if let Some((title, _)) = LOGIN_SPEC_SECTIONS.iter().find(|(t, _)| *t == requested) {
                    if !sections.contains(title) {
                        sections.push(*title);
                    }
                }
            }
        }
        let complete = sections.len() == LOGIN_SPEC_SECTIONS.len();
        debug!(agent = %self.id, sections = sections.len(), "spec draft written");
        AgentOutput::new(
            self.id.clone(),
            input.task_id().clone(),
            true,
            json!({ "artifact": login_spec(&sections), "sections": sections }),
            format!("drafted {} of {} sections", sections.len(), LOGIN_SPEC_SECTIONS.len()),
            if complete { 0.9 } else { 0.6 },
            if complete { vec![] } else { vec!["await gate feedback".to_string()] },
        )
    }
}

/// One domain agent of the feature scenario. Reports which upstream
/// outputs it could see when it ran.
pub struct FeatureAgent {
    id: AgentId,
    deliverable: &'static str,
}

impl FeatureAgent {
    pub fn new(id: &str, deliverable: &'static str) -> Self {
        Self {
            id: AgentId::new(id),
            deliverable,
        }
    }
}

impl Agent for FeatureAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn invoke(&self, input: &AgentInput) -> TemperResult<AgentOutput> {
        let upstream: Vec<String> = input
            .context()
            .history()
            .iter()
            .map(|o| o.agent_id().to_string())
            .collect();
        AgentOutput::new(
            self.id.clone(),
            input.task_id().clone(),
            true,
            json!({
                "artifact": format!("## {}\n{}", self.id, self.deliverable),
                "saw": upstream,
            }),
            format!("delivered {}", self.deliverable),
            0.85,
            vec![],
        )
    }
}

/// Writes the `add` function and runs its tests before handing it over.
/// The draft has a syntax error, which it reports as an execution failure.
pub struct CodeAgent {
    id: AgentId,
}

impl CodeAgent {
    pub fn new() -> Self {
        Self {
            id: AgentId::new("code-agent"),
        }
    }
}

impl Default for CodeAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for CodeAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn invoke(&self, input: &AgentInput) -> TemperResult<AgentOutput> {
        let payload = match HeaderCheckRunner.run(BROKEN_ADD)? {
            TestOutcome::Failed {
                error_message,
                stack_trace,
            } => json!({
                "execution_failure": {
                    "artifact": BROKEN_ADD,
                    "error_message": error_message,
                    "stack_trace": stack_trace,
                }
            }),
            _ => json!({ "artifact": BROKEN_ADD }),
        };
        debug!(agent = %self.id, failed = payload.get("execution_failure").is_some(), "code tests ran");
        AgentOutput::new(
            self.id.clone(),
            input.task_id().clone(),
            true,
            payload,
            "implemented add() and ran its tests",
            0.7,
            vec![],
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use temper_contracts::agent::{AgentContext, AgentId, AgentInput, Phase, TaskId};
    use temper_core::traits::Agent;

    use super::{CodeAgent, SpecWriterAgent};

    fn input(agent: &str, context: AgentContext) -> AgentInput {
        AgentInput::new(AgentId::new(agent), TaskId::new("task-agents"), Phase::Specification, json!({}), context)
            .unwrap()
    }

    #[test]
    fn test_spec_writer_follows_feedback() {
        let agent = SpecWriterAgent::new();
        let first = agent.invoke(&input("spec-writer", AgentContext::new())).unwrap();
        let draft = first.payload()["artifact"].as_str().unwrap();
        assert!(!draft.contains("## Requirements"));

        let mut context = AgentContext::new();
        context.add_feedback(vec![
            "add a '## Requirements' section".to_string(),
            "add a '## User Scenarios' section".to_string(),
        ]);
        let second = agent.invoke(&input("spec-writer", context)).unwrap();
        let draft = second.payload()["artifact"].as_str().unwrap();
        assert!(draft.contains("## Requirements"));
        assert!(draft.find("## User Scenarios").unwrap() < draft.find("## Requirements").unwrap());
    }

    #[test]
    fn test_code_agent_reports_failure() {
        let output = CodeAgent::new().invoke(&input("code-agent", AgentContext::new())).unwrap();
        let failure = &output.payload()["execution_failure"];
        assert_eq!(failure["error_message"], "SyntaxError: expected ':'");
    }
}
