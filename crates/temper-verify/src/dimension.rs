//! The dimension check seam.
//!
//! A `DimensionCheck` scores one `Dimension` for the artifact types it
//! applies to. Checks are pluggable: the gate ships with built-ins for all
//! four dimensions and accepts more through `VerificationGate::with_check`.

use temper_contracts::verify::{ArtifactType, Dimension, JsonRuleSet};

use crate::artifact::LoadedArtifact;

/// What a check gets to look at.
pub struct CheckContext<'a> {
    pub artifact: &'a LoadedArtifact,
    pub source_spec: Option<&'a str>,
    pub json_rules: Option<&'a JsonRuleSet>,
}

/// The result of one named rule inside a dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub id: String,
    pub passed: bool,
    /// The subject of the check does not exist at all (a missing section,
    /// a missing field). Reported with the `missing-` prefix.
    pub absent: bool,
    pub feedback: Option<String>,
}

impl CheckResult {
    pub fn pass(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            passed: true,
            absent: false,
            feedback: None,
        }
    }

    pub fn fail(id: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            passed: false,
            absent: false,
            feedback: Some(feedback.into()),
        }
    }

    pub fn missing(id: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            absent: true,
            ..Self::fail(id, feedback)
        }
    }

    /// The id as it appears in the decision's check lists.
    pub fn reported_id(&self) -> String {
        if self.absent {
            format!("missing-{}", self.id)
        } else {
            self.id.clone()
        }
    }
}

/// One dimension's score plus the checks behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionOutcome {
    pub score: f64,
    pub passed: Vec<String>,
    pub violated: Vec<String>,
    pub feedback: Vec<String>,
}

impl DimensionOutcome {
    /// Score as the fraction of passing checks. `None` for an empty list.
    pub fn from_checks(checks: Vec<CheckResult>) -> Option<Self> {
        if checks.is_empty() {
            return None;
        }
        let total = checks.len() as f64;
        let passing = checks.iter().filter(|c| c.passed).count() as f64;
        Some(Self::with_score(passing / total, checks))
    }

    /// Use an explicit score; `checks` only populate the lists.
    pub fn with_score(score: f64, checks: Vec<CheckResult>) -> Self {
        let mut outcome = Self {
            score: score.clamp(0.0, 1.0),
            passed: Vec::new(),
            violated: Vec::new(),
            feedback: Vec::new(),
        };
        for check in checks {
            if check.passed {
                outcome.passed.push(check.reported_id());
            } else {
                outcome.violated.push(check.reported_id());
                outcome.feedback.extend(check.feedback);
            }
        }
        outcome
    }
}

pub trait DimensionCheck: Send + Sync {
    fn dimension(&self) -> Dimension;

    fn applies_to(&self, artifact_type: ArtifactType) -> bool;

    /// `None` means the dimension does not apply to this artifact (e.g.
    /// alignment without a source specification) and is left out of the
    /// weighted score.
    fn evaluate(&self, ctx: &CheckContext<'_>) -> Option<DimensionOutcome>;
}
