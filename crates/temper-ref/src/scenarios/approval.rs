//! Scenario 5: Finalization approval
//!
//! The refined login specification is ready to be committed to the
//! project's `specs/` directory. That write is irreversible, so it goes
//! through the finalization gate:
//!
//!   1. request → no approval yet → awaiting approval, nothing written
//!   2. a reviewer rejects → rejected, nothing written
//!   3. a fresh request → the lead grants it → the file is written

use std::fs;
use std::path::Path;
use std::sync::Arc;

use temper_audit::InMemoryDecisionLog;
use temper_contracts::{
    agent::TaskId,
    approval::{Approval, OperationSummary},
    error::{TemperError, TemperResult},
};
use temper_core::{traits::DecisionLog, FinalizationGate, FinalizeOutcome};

use crate::mock_data::{login_spec, LOGIN_SPEC_SECTIONS};

const TARGET: &str = "specs/login/spec.md";

pub struct ApprovalReport {
    pub awaited: bool,
    pub written_before_approval: bool,
    pub rejected_by: Option<String>,
    pub committed: Option<String>,
    pub audit_labels: Vec<&'static str>,
}

fn summary(task_id: &TaskId) -> OperationSummary {
    OperationSummary {
        task_id: task_id.clone(),
        action: "commit-specification".to_string(),
        targets: vec![TARGET.to_string()],
        description: "write the refined login specification into the project".to_string(),
        quality_score: Some(0.93),
    }
}

fn commit(root: &Path, spec: &str, summary: &OperationSummary) -> TemperResult<String> {
    let mut written = Vec::new();
    for target in &summary.targets {
        let path = root.join(target);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TemperError::Store {
                reason: format!("failed to create '{}': {e}", parent.display()),
            })?;
        }
        fs::write(&path, spec).map_err(|e| TemperError::Store {
            reason: format!("failed to write '{}': {e}", path.display()),
        })?;
        written.push(target.clone());
    }
    Ok(written.join(", "))
}

pub fn run() -> TemperResult<ApprovalReport> {
    let workspace = tempfile::tempdir().map_err(|e| TemperError::Store {
        reason: format!("failed to create workspace: {e}"),
    })?;
    let root = workspace.path();
    let log = InMemoryDecisionLog::new();
    let gate = FinalizationGate::new(Arc::new(log.clone()));
    let task_id = TaskId::generate();
    let all: Vec<&str> = LOGIN_SPEC_SECTIONS.iter().map(|(title, _)| *title).collect();
    let spec = login_spec(&all);

    let first = gate.request(summary(&task_id))?;
    let awaited = matches!(
        gate.finalize(&first, None, |s| commit(root, &spec, s))?,
        FinalizeOutcome::AwaitingApproval { .. }
    );
    let written_before_approval = root.join(TARGET).exists();

    let rejection = Approval::reject(&first.request_id, "reviewer");
    let rejected_by = match gate.finalize(&first, Some(&rejection), |s| commit(root, &spec, s))? {
        FinalizeOutcome::Rejected { approval } => Some(approval.approver),
        _ => None,
    };

    let second = gate.request(summary(&task_id))?;
    let grant = Approval::grant(&second.request_id, "lead");
    let committed = match gate.finalize(&second, Some(&grant), |s| commit(root, &spec, s))? {
        FinalizeOutcome::Completed { .. } => {
            Some(fs::read_to_string(root.join(TARGET)).map_err(|e| TemperError::Store {
                reason: format!("failed to read back '{TARGET}': {e}"),
            })?)
        }
        _ => None,
    };

    let audit_labels = log
        .history(&task_id)?
        .iter()
        .map(|record| record.kind.label())
        .collect();

    Ok(ApprovalReport {
        awaited,
        written_before_approval,
        rejected_by,
        committed,
        audit_labels,
    })
}

pub fn run_scenario() -> TemperResult<()> {
    println!("=== Scenario 5: Finalization approval ===");
    println!();
    println!("  Action: commit-specification → {TARGET}");
    println!();

    let report = run()?;
    println!(
        "  No approval       : {}",
        if report.awaited { "awaiting approval, nothing written" } else { "unexpected" }
    );
    match &report.rejected_by {
        Some(approver) => println!("  Rejected by       : {approver}, nothing written"),
        None => println!("  Rejected by       : -"),
    }
    match &report.committed {
        Some(text) => println!("  Granted by lead   : wrote {} bytes", text.len()),
        None => println!("  Granted by lead   : nothing written"),
    }
    println!("  Audit trail       : {}", report.audit_labels.join(" → "));
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn test_nothing_written_without_approval() {
        let report = run().unwrap();

        assert!(report.awaited);
        assert!(!report.written_before_approval);
        assert_eq!(report.rejected_by.as_deref(), Some("reviewer"));
    }

    #[test]
    fn test_granted_request_commits_the_spec() {
        let report = run().unwrap();

        let committed = report.committed.unwrap();
        assert!(committed.contains("## Requirements"));
        assert_eq!(
            report.audit_labels,
            vec![
                "approval-requested",
                "approval-answered",
                "approval-requested",
                "approval-answered",
            ]
        );
    }
}
