//! Finalization approval types.
//!
//! Before any irreversible external action the core emits an
//! `ApprovalRequest` with `approval_required = true` and stops. Only an
//! `Approval` carrying the same request id and `granted = true` lets the
//! action run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::TaskId;

/// Structured description of the action awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub task_id: TaskId,
    /// Short action name, e.g. "commit-results".
    pub action: String,
    /// What the action will touch.
    pub targets: Vec<String>,
    pub description: String,
    /// Final quality score of the work being finalized, if known.
    pub quality_score: Option<f64>,
}

/// Emitted to the finalization collaborator. Always requires approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub summary: OperationSummary,
    pub approval_required: bool,
    pub requested_at: DateTime<Utc>,
}

/// An external caller's answer to an `ApprovalRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub request_id: String,
    pub granted: bool,
    pub approver: String,
    pub decided_at: DateTime<Utc>,
}

impl Approval {
    pub fn grant(request_id: impl Into<String>, approver: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            granted: true,
            approver: approver.into(),
            decided_at: Utc::now(),
        }
    }

    pub fn reject(request_id: impl Into<String>, approver: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            granted: false,
            approver: approver.into(),
            decided_at: Utc::now(),
        }
    }
}
