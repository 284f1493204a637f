//! Decision records: the unit of the append-only audit trail.
//!
//! Every component that takes a decision writes one `DecisionRecord` to the
//! decision log for the task. Records are never modified once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    agent::{AgentOutput, TaskId},
    approval::{Approval, ApprovalRequest},
    debug::DebugAttempt,
    refinement::EscalationReason,
    routing::{RefinementStrategy, RoutingDecision},
    verify::VerificationDecision,
};

/// What was decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DecisionKind {
    Verification { decision: VerificationDecision },
    Routing { decision: RoutingDecision },
    RefinementStrategy {
        strategy: RefinementStrategy,
        rationale: String,
    },
    DebugAttempt { attempt: DebugAttempt },
    AgentOutput { output: AgentOutput },
    Escalation { reason: EscalationReason },
    ApprovalRequested { request: ApprovalRequest },
    ApprovalAnswered { approval: Approval },
}

impl DecisionKind {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionKind::Verification { .. } => "verification",
            DecisionKind::Routing { .. } => "routing",
            DecisionKind::RefinementStrategy { .. } => "refinement-strategy",
            DecisionKind::DebugAttempt { .. } => "debug-attempt",
            DecisionKind::AgentOutput { .. } => "agent-output",
            DecisionKind::Escalation { .. } => "escalation",
            DecisionKind::ApprovalRequested { .. } => "approval-requested",
            DecisionKind::ApprovalAnswered { .. } => "approval-answered",
        }
    }
}

/// An immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub task_id: TaskId,
    /// The component that took the decision (e.g. "verification-gate").
    pub component: String,
    pub kind: DecisionKind,
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(task_id: TaskId, component: impl Into<String>, kind: DecisionKind) -> Self {
        Self {
            task_id,
            component: component.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}
