//! Verification Gate request and decision types.
//!
//! The gate turns an artifact into a `VerificationDecision`: a binary
//! sufficient/insufficient verdict, a continuous quality score, per-dimension
//! scores, and feedback. The decision type enforces its own invariants at
//! construction so an inconsistent decision can never be built.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    agent::{Phase, TaskId},
    error::{TemperError, TemperResult},
};

/// One independently scored aspect of artifact quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dimension {
    /// Are all required parts present?
    Completeness,
    /// Does the artifact follow the rules for its type?
    Compliance,
    /// Is everything that should be traced or tested actually covered?
    Coverage,
    /// Does the artifact stay on topic with its source specification?
    Alignment,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Completeness => "completeness",
            Dimension::Compliance => "compliance",
            Dimension::Coverage => "coverage",
            Dimension::Alignment => "alignment",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The binary gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Sufficient,
    Insufficient,
}

/// The declared kind of an artifact; selects which dimension checks apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    Specification,
    Plan,
    Code,
    Json,
}

/// Where the artifact content lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ArtifactRef {
    Path { path: PathBuf },
    Inline { content: String },
}

/// An artifact under evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub reference: ArtifactRef,
    pub artifact_type: ArtifactType,
}

impl Artifact {
    pub fn inline(artifact_type: ArtifactType, content: impl Into<String>) -> Self {
        Self {
            reference: ArtifactRef::Inline {
                content: content.into(),
            },
            artifact_type,
        }
    }

    pub fn at_path(artifact_type: ArtifactType, path: impl Into<PathBuf>) -> Self {
        Self {
            reference: ArtifactRef::Path { path: path.into() },
            artifact_type,
        }
    }

    /// Short label for logs: the path, or `inline:<n> bytes`.
    pub fn label(&self) -> String {
        match &self.reference {
            ArtifactRef::Path { path } => path.display().to_string(),
            ArtifactRef::Inline { content } => format!("inline:{} bytes", content.len()),
        }
    }
}

/// Declarative rules for structured (JSON) artifacts.
///
/// Combines a JSON Schema document with field-level rules that go beyond
/// what JSON Schema expresses. Evaluated as the compliance dimension of
/// `ArtifactType::Json` artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRuleSet {
    /// Unique identifier (e.g. "routing-plan-v1").
    pub rule_set_id: String,
    /// JSON Schema document for structural validation. `Null` skips it.
    pub json_schema: Value,
    /// Field rules evaluated after structural validation.
    pub rules: Vec<FieldRule>,
}

/// A single field-level rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Referenced in violated/passed check lists.
    pub rule_id: String,
    pub description: String,
    pub rule_type: FieldRuleType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldRuleType {
    /// The field at `field_path` must be present and non-null.
    RequiredField { field_path: String },

    /// The field at `field_path` must equal one of `allowed`.
    AllowedValues {
        field_path: String,
        allowed: Vec<Value>,
    },

    /// The string field at `field_path` must not contain `pattern`.
    ForbiddenPattern { field_path: String, pattern: String },
}

/// A request to evaluate one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub task_id: TaskId,
    pub phase: Phase,
    pub artifact: Artifact,
    /// The specification the artifact should stay aligned with, if any.
    pub source_spec: Option<String>,
    /// Rules for `ArtifactType::Json` artifacts.
    pub json_rules: Option<JsonRuleSet>,
}

impl VerificationRequest {
    pub fn new(task_id: TaskId, phase: Phase, artifact: Artifact) -> Self {
        Self {
            task_id,
            phase,
            artifact,
            source_spec: None,
            json_rules: None,
        }
    }

    pub fn with_source_spec(mut self, spec: impl Into<String>) -> Self {
        self.source_spec = Some(spec.into());
        self
    }

    pub fn with_json_rules(mut self, rules: JsonRuleSet) -> Self {
        self.json_rules = Some(rules);
        self
    }
}

/// The gate's verdict on one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationDecision {
    pub task_id: TaskId,
    pub phase: Phase,
    pub decision: Decision,
    pub quality_score: f64,
    /// The threshold the decision was taken against.
    pub threshold: f64,
    pub dimension_scores: BTreeMap<Dimension, f64>,
    pub feedback: Vec<String>,
    pub violated_checks: Vec<String>,
    pub passed_checks: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

impl VerificationDecision {
    /// Build a decision from a computed score.
    ///
    /// The verdict is derived, never supplied: sufficient iff
    /// `quality_score >= threshold`. An insufficient verdict without feedback
    /// is rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn from_scores(
        task_id: TaskId,
        phase: Phase,
        threshold: f64,
        quality_score: f64,
        dimension_scores: BTreeMap<Dimension, f64>,
        feedback: Vec<String>,
        violated_checks: Vec<String>,
        passed_checks: Vec<String>,
    ) -> TemperResult<Self> {
        if !(0.0..=1.0).contains(&quality_score) {
            return Err(TemperError::StateMachine {
                reason: format!("quality score {quality_score} outside [0, 1]"),
            });
        }
        let decision = if quality_score >= threshold {
            Decision::Sufficient
        } else {
            Decision::Insufficient
        };
        if decision == Decision::Insufficient && feedback.is_empty() {
            return Err(TemperError::StateMachine {
                reason: "an insufficient decision must carry feedback".to_string(),
            });
        }
        Ok(Self {
            task_id,
            phase,
            decision,
            quality_score,
            threshold,
            dimension_scores,
            feedback,
            violated_checks,
            passed_checks,
            decided_at: Utc::now(),
        })
    }

    /// An insufficient decision for an artifact that could not be evaluated
    /// at all (unreadable, unparsable, or failing to execute). Score 0, one
    /// feedback item describing the problem, `check` recorded as violated.
    pub fn rejected(
        task_id: TaskId,
        phase: Phase,
        threshold: f64,
        check: impl Into<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            phase,
            decision: Decision::Insufficient,
            quality_score: 0.0,
            threshold,
            dimension_scores: BTreeMap::new(),
            feedback: vec![problem.into()],
            violated_checks: vec![check.into()],
            passed_checks: Vec::new(),
            decided_at: Utc::now(),
        }
    }

    pub fn is_sufficient(&self) -> bool {
        self.decision == Decision::Sufficient
    }

    /// Check both decision invariants; used on deserialized decisions.
    pub fn check_invariants(&self) -> bool {
        match self.decision {
            Decision::Sufficient => self.quality_score >= self.threshold,
            Decision::Insufficient => {
                self.quality_score < self.threshold && !self.feedback.is_empty()
            }
        }
    }
}
