//! The verification gate.
//!
//! Loads the artifact, runs every applicable dimension check, combines the
//! dimension scores into one weighted quality score, and records the
//! resulting `VerificationDecision` in the decision log before returning it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use temper_contracts::{
    error::TemperResult,
    record::{DecisionKind, DecisionRecord},
    verify::{Dimension, VerificationDecision, VerificationRequest},
};
use temper_core::config::{DimensionWeights, PhaseThresholds};
use temper_core::traits::{DecisionLog, Gate};

use crate::artifact::LoadedArtifact;
use crate::checks::builtin_checks;
use crate::dimension::{CheckContext, DimensionCheck, DimensionOutcome};

const COMPONENT: &str = "verification-gate";

pub struct VerificationGate {
    weights: DimensionWeights,
    thresholds: PhaseThresholds,
    checks: Vec<Box<dyn DimensionCheck>>,
    log: Arc<dyn DecisionLog>,
}

impl VerificationGate {
    /// A gate with the built-in checks for all four dimensions.
    pub fn new(
        weights: DimensionWeights,
        thresholds: PhaseThresholds,
        log: Arc<dyn DecisionLog>,
    ) -> Self {
        Self {
            weights,
            thresholds,
            checks: builtin_checks(),
            log,
        }
    }

    /// Add a check. It replaces any earlier check for the same dimension
    /// and artifact types.
    pub fn with_check(mut self, check: Box<dyn DimensionCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// The last registered check for each dimension that applies.
    fn evaluate(&self, ctx: &CheckContext<'_>) -> BTreeMap<Dimension, DimensionOutcome> {
        let mut outcomes = BTreeMap::new();
        let mut decided: Vec<Dimension> = Vec::new();
        for check in self.checks.iter().rev() {
            let dimension = check.dimension();
            if decided.contains(&dimension) || !check.applies_to(ctx.artifact.artifact_type) {
                continue;
            }
            decided.push(dimension);
            if let Some(outcome) = check.evaluate(ctx) {
                outcomes.insert(dimension, outcome);
            }
        }
        outcomes
    }

    fn record(&self, decision: &VerificationDecision) -> TemperResult<()> {
        self.log.append(&DecisionRecord::new(
            decision.task_id.clone(),
            COMPONENT,
            DecisionKind::Verification {
                decision: decision.clone(),
            },
        ))
    }

    fn reject(
        &self,
        request: &VerificationRequest,
        threshold: f64,
        check: &str,
        problem: String,
    ) -> TemperResult<VerificationDecision> {
        warn!(
            task_id = %request.task_id,
            artifact = %request.artifact.label(),
            check,
            %problem,
            "artifact rejected before scoring"
        );
        let decision = VerificationDecision::rejected(
            request.task_id.clone(),
            request.phase,
            threshold,
            check,
            problem,
        );
        self.record(&decision)?;
        Ok(decision)
    }
}

impl Gate for VerificationGate {
    fn verify(&self, request: &VerificationRequest) -> TemperResult<VerificationDecision> {
        let threshold = self.thresholds.for_phase(request.phase);
        let artifact = match LoadedArtifact::load(&request.artifact) {
            Ok(artifact) => artifact,
            Err(e) => return self.reject(request, threshold, e.check, e.problem),
        };

        let ctx = CheckContext {
            artifact: &artifact,
            source_spec: request.source_spec.as_deref(),
            json_rules: request.json_rules.as_ref(),
        };
        let outcomes = self.evaluate(&ctx);

        // Weights are renormalized over the dimensions that applied.
        let total_weight: f64 = outcomes.keys().map(|d| self.weights.weight(*d)).sum();
        if outcomes.is_empty() || total_weight <= 0.0 {
            return self.reject(
                request,
                threshold,
                "no-applicable-checks",
                format!(
                    "no weighted dimension check applies to a {:?} artifact",
                    artifact.artifact_type
                ),
            );
        }
        let score = outcomes
            .iter()
            .map(|(d, o)| self.weights.weight(*d) * o.score)
            .sum::<f64>()
            / total_weight;
        let score = score.clamp(0.0, 1.0);

        let mut dimension_scores = BTreeMap::new();
        let mut feedback = Vec::new();
        let mut violated = Vec::new();
        let mut passed = Vec::new();
        for (dimension, outcome) in outcomes {
            debug!(task_id = %request.task_id, %dimension, score = outcome.score, "dimension scored");
            dimension_scores.insert(dimension, outcome.score);
            if outcome.score < threshold {
                if outcome.feedback.is_empty() {
                    let mut line = format!(
                        "raise {dimension} from {:.2} to at least {threshold:.2}",
                        outcome.score
                    );
                    if !outcome.violated.is_empty() {
                        line.push_str(&format!(" (violated: {})", outcome.violated.join(", ")));
                    }
                    feedback.push(line);
                } else {
                    feedback.extend(outcome.feedback);
                }
            }
            violated.extend(outcome.violated);
            passed.extend(outcome.passed);
        }
        if score < threshold && feedback.is_empty() {
            feedback.push(format!(
                "raise the overall quality from {score:.2} to at least {threshold:.2}"
            ));
        }

        let decision = VerificationDecision::from_scores(
            request.task_id.clone(),
            request.phase,
            threshold,
            score,
            dimension_scores,
            feedback,
            violated,
            passed,
        )?;
        self.record(&decision)?;
        info!(
            task_id = %request.task_id,
            phase = %request.phase,
            artifact = %request.artifact.label(),
            score = decision.quality_score,
            decision = ?decision.decision,
            "artifact verified"
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use serde_json::json;

    use temper_audit::InMemoryDecisionLog;
    use temper_contracts::{
        agent::{Phase, TaskId},
        error::TemperError,
        record::DecisionKind,
        verify::{
            Artifact, ArtifactType, Decision, Dimension, FieldRule, FieldRuleType, JsonRuleSet,
            VerificationRequest,
        },
    };
    use temper_core::config::{DimensionWeights, PhaseThresholds};
    use temper_core::traits::{DecisionLog, Gate};

    use crate::dimension::{CheckContext, DimensionCheck, DimensionOutcome};

    use super::VerificationGate;

    const COMPLETE_SPEC: &str = "\
# Login

## Overview
Users log in with an email and a password.

## User Scenarios
1. Given a registered user, when they submit valid credentials, then they reach the dashboard (FR-001).
2. Given a locked account, when they log in, then they see a lockout notice (FR-002).

## Requirements
- FR-001: The system MUST authenticate users by email and password.
- FR-002: The system MUST lock an account after five failed attempts.

## Success Criteria
- FR-001 and FR-002 verified by acceptance tests.
";

    fn gate(log: Arc<InMemoryDecisionLog>) -> VerificationGate {
        VerificationGate::new(DimensionWeights::default(), PhaseThresholds::default(), log)
    }

    fn spec_request(text: &str) -> VerificationRequest {
        VerificationRequest::new(
            TaskId::new("task-gate"),
            Phase::Specification,
            Artifact::inline(ArtifactType::Specification, text),
        )
    }

    #[test]
    fn test_complete_spec_is_sufficient() {
        let log = Arc::new(InMemoryDecisionLog::new());
        let decision = gate(log.clone()).verify(&spec_request(COMPLETE_SPEC)).unwrap();

        assert_eq!(decision.decision, Decision::Sufficient);
        assert!((decision.quality_score - 1.0).abs() < 1e-9);
        assert!(!decision.dimension_scores.contains_key(&Dimension::Alignment));
        assert!(decision.violated_checks.is_empty());

        let history = log.history(&TaskId::new("task-gate")).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].component, "verification-gate");
        assert!(matches!(history[0].kind, DecisionKind::Verification { .. }));
    }

    #[test]
    fn test_spec_missing_sections_scores_low_with_feedback() {
        let spec = "## Overview\nUsers log in.\n\n## Success Criteria\n- Login takes under a second.\n";
        let decision = gate(Arc::new(InMemoryDecisionLog::new()))
            .verify(&spec_request(spec))
            .unwrap();

        assert_eq!(decision.decision, Decision::Insufficient);
        assert!((decision.quality_score - 0.304).abs() < 0.01, "{}", decision.quality_score);
        assert!(decision.violated_checks.contains(&"missing-requirements".to_string()));
        assert!(decision.violated_checks.contains(&"missing-user-scenarios".to_string()));
        assert!(decision.feedback.iter().any(|f| f.contains("'## Requirements'")));
        assert!(decision.feedback.iter().any(|f| f.contains("'## User Scenarios'")));
        assert!(decision.check_invariants());
    }

    #[test]
    fn test_unreadable_artifact_is_rejected_and_logged() {
        let log = Arc::new(InMemoryDecisionLog::new());
        let request = VerificationRequest::new(
            TaskId::new("task-gate"),
            Phase::Planning,
            Artifact::at_path(ArtifactType::Plan, "/nonexistent/plan.md"),
        );
        let decision = gate(log.clone()).verify(&request).unwrap();

        assert_eq!(decision.quality_score, 0.0);
        assert_eq!(decision.violated_checks, vec!["artifact-readable"]);
        assert!(decision.feedback[0].contains("/nonexistent/plan.md"));
        assert_eq!(log.history(&request.task_id).unwrap().len(), 1);
    }

    #[test]
    fn test_plan_from_file_with_alignment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "## Summary\nAuthenticate users by email and password; lock accounts.\n\
             ## Technical Context\nRust service.\n\
             ## Phase 1\nBuild login.\n\
             ## Tasks\n- T001 implement FR-001 password check\n- T002 implement FR-002 lockout\n"
        )
        .unwrap();
        let request = VerificationRequest::new(
            TaskId::new("task-plan"),
            Phase::Planning,
            Artifact::at_path(ArtifactType::Plan, file.path()),
        )
        .with_source_spec(COMPLETE_SPEC);

        let decision = gate(Arc::new(InMemoryDecisionLog::new())).verify(&request).unwrap();

        assert_eq!(decision.dimension_scores[&Dimension::Completeness], 1.0);
        assert_eq!(decision.dimension_scores[&Dimension::Coverage], 1.0);
        assert!(decision.dimension_scores.contains_key(&Dimension::Alignment));
    }

    #[test]
    fn test_json_artifact_with_rules() {
        let rules = JsonRuleSet {
            rule_set_id: "routing-plan-v1".to_string(),
            json_schema: json!({
                "type": "object",
                "properties": { "mode": { "type": "string" } },
                "required": ["mode"]
            }),
            rules: vec![FieldRule {
                rule_id: "mode-allowed".to_string(),
                description: "mode is a known strategy".to_string(),
                rule_type: FieldRuleType::AllowedValues {
                    field_path: "mode".to_string(),
                    allowed: vec![json!("dag"), json!("parallel")],
                },
            }],
        };
        let gate = gate(Arc::new(InMemoryDecisionLog::new()));
        let request = |content: &str| {
            VerificationRequest::new(
                TaskId::new("task-json"),
                Phase::Planning,
                Artifact::inline(ArtifactType::Json, content),
            )
            .with_json_rules(rules.clone())
        };

        let good = gate.verify(&request(r#"{"mode": "dag"}"#)).unwrap();
        assert_eq!(good.decision, Decision::Sufficient);

        let bad = gate.verify(&request(r#"{"mode": "random"}"#)).unwrap();
        assert_eq!(bad.decision, Decision::Insufficient);
        assert!(bad.violated_checks.contains(&"mode-allowed".to_string()));

        let broken = gate.verify(&request("{not json")).unwrap();
        assert_eq!(broken.violated_checks, vec!["artifact-parsable"]);
    }

    struct FixedScore(f64);

    impl DimensionCheck for FixedScore {
        fn dimension(&self) -> Dimension {
            Dimension::Completeness
        }

        fn applies_to(&self, _artifact_type: ArtifactType) -> bool {
            true
        }

        fn evaluate(&self, _ctx: &CheckContext<'_>) -> Option<DimensionOutcome> {
            Some(DimensionOutcome::with_score(self.0, vec![]))
        }
    }

    #[test]
    fn test_custom_check_overrides_builtin_and_feedback_is_synthesized() {
        let weights = DimensionWeights {
            completeness: 1.0,
            compliance: 0.0,
            coverage: 0.0,
            alignment: 0.0,
        };
        let gate = VerificationGate::new(
            weights,
            PhaseThresholds::default(),
            Arc::new(InMemoryDecisionLog::new()),
        )
        .with_check(Box::new(FixedScore(0.5)));

        let decision = gate.verify(&spec_request(COMPLETE_SPEC)).unwrap();
        assert_eq!(decision.quality_score, 0.5);
        assert!(decision.feedback[0].contains("raise completeness"));
    }

    #[test]
    fn test_audit_failure_propagates() {
        struct Refusing;
        impl DecisionLog for Refusing {
            fn append(
                &self,
                _record: &temper_contracts::record::DecisionRecord,
            ) -> Result<(), TemperError> {
                Err(TemperError::AuditWriteFailed {
                    reason: "read-only".to_string(),
                })
            }
            fn history(
                &self,
                _task_id: &TaskId,
            ) -> Result<Vec<temper_contracts::record::DecisionRecord>, TemperError> {
                Ok(vec![])
            }
        }

        let gate = VerificationGate::new(
            DimensionWeights::default(),
            PhaseThresholds::default(),
            Arc::new(Refusing),
        );
        let err = gate.verify(&spec_request(COMPLETE_SPEC)).unwrap_err();
        assert!(matches!(err, TemperError::AuditWriteFailed { .. }));
    }
}
