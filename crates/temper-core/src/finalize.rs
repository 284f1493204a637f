//! The finalization gate.
//!
//! Irreversible external actions (committing results, publishing, writing
//! outside the workspace) run only through `FinalizationGate::finalize`, and
//! only with an affirmative `Approval` for the exact request that described
//! them. Without one the gate returns `AwaitingApproval` and does nothing.
//! A request is answered once: the answer is recorded in the decision log,
//! and any later answer to the same request is refused.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use temper_contracts::{
    approval::{Approval, ApprovalRequest, OperationSummary},
    error::{TemperError, TemperResult},
    record::{DecisionKind, DecisionRecord},
};

use crate::traits::DecisionLog;

const COMPONENT: &str = "finalization-gate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum FinalizeOutcome<T> {
    /// The approval was granted and the action ran.
    Completed { result: T },
    /// No approval yet; nothing ran.
    AwaitingApproval { request: ApprovalRequest },
    /// The approver said no; nothing ran.
    Rejected { approval: Approval },
}

pub struct FinalizationGate {
    log: Arc<dyn DecisionLog>,
    /// Serializes the answered check with the answer's log append.
    answering: Mutex<()>,
}

impl FinalizationGate {
    pub fn new(log: Arc<dyn DecisionLog>) -> Self {
        Self {
            log,
            answering: Mutex::new(()),
        }
    }

    /// Describe a pending action. The request always requires approval.
    pub fn request(&self, summary: OperationSummary) -> TemperResult<ApprovalRequest> {
        let request = ApprovalRequest {
            request_id: format!("approval-{}", uuid::Uuid::new_v4()),
            summary,
            approval_required: true,
            requested_at: chrono::Utc::now(),
        };
        self.log.append(&DecisionRecord::new(
            request.summary.task_id.clone(),
            COMPONENT,
            DecisionKind::ApprovalRequested {
                request: request.clone(),
            },
        ))?;
        info!(
            task_id = %request.summary.task_id,
            request_id = %request.request_id,
            action = %request.summary.action,
            "approval requested"
        );
        Ok(request)
    }

    /// Run `action` if and only if `approval` grants `request`.
    ///
    /// # Errors
    ///
    /// `ApprovalRequired` when the approval answers a different request or
    /// the request was already answered; any error returned by `action`
    /// itself.
    pub fn finalize<T, F>(
        &self,
        request: &ApprovalRequest,
        approval: Option<&Approval>,
        action: F,
    ) -> TemperResult<FinalizeOutcome<T>>
    where
        F: FnOnce(&OperationSummary) -> TemperResult<T>,
    {
        let task_id = &request.summary.task_id;
        let approval = match approval {
            None => {
                info!(
                    task_id = %task_id,
                    request_id = %request.request_id,
                    "finalization suspended awaiting approval"
                );
                return Ok(FinalizeOutcome::AwaitingApproval {
                    request: request.clone(),
                });
            }
            Some(approval) => approval,
        };

        if approval.request_id != request.request_id {
            warn!(
                task_id = %task_id,
                request_id = %request.request_id,
                answered = %approval.request_id,
                "approval does not match the pending request"
            );
            return Err(TemperError::ApprovalRequired {
                reason: format!(
                    "approval '{}' does not answer request '{}'",
                    approval.request_id, request.request_id
                ),
            });
        }

        {
            let _answering = self.answering.lock().map_err(|e| TemperError::Store {
                reason: format!("finalization gate lock poisoned: {e}"),
            })?;
            if self.answered(request)? {
                warn!(
                    task_id = %task_id,
                    request_id = %request.request_id,
                    "approval request was already answered"
                );
                return Err(TemperError::ApprovalRequired {
                    reason: format!(
                        "request '{}' was already answered; request approval again",
                        request.request_id
                    ),
                });
            }
            self.log.append(&DecisionRecord::new(
                task_id.clone(),
                COMPONENT,
                DecisionKind::ApprovalAnswered {
                    approval: approval.clone(),
                },
            ))?;
        }

        if !approval.granted {
            info!(
                task_id = %task_id,
                approver = %approval.approver,
                "finalization rejected"
            );
            return Ok(FinalizeOutcome::Rejected {
                approval: approval.clone(),
            });
        }

        info!(
            task_id = %task_id,
            approver = %approval.approver,
            action = %request.summary.action,
            "finalization approved, running action"
        );
        let result = action(&request.summary)?;
        Ok(FinalizeOutcome::Completed { result })
    }

    fn answered(&self, request: &ApprovalRequest) -> TemperResult<bool> {
        let history = self.log.history(&request.summary.task_id)?;
        Ok(history.iter().any(|r| match &r.kind {
            DecisionKind::ApprovalAnswered { approval } => approval.request_id == request.request_id,
            _ => false,
        }))
    }
}
