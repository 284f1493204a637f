//! Compliance: does the artifact follow the rules for its type?

use std::sync::LazyLock;

use regex::Regex;

use temper_contracts::verify::{ArtifactType, Dimension};

use crate::artifact::LoadedArtifact;
use crate::checks::{no_placeholders, requirement_ids, REQUIREMENT_ID};
use crate::dimension::{CheckContext, CheckResult, DimensionCheck, DimensionOutcome};
use crate::schema::evaluate_rules;

static MUST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bMUST\b").expect("valid regex"));

static GIVEN_WHEN_THEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bgiven\b.+\bwhen\b.+\bthen\b").expect("valid regex")
});

static TASK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bT\d{3}\b").expect("valid regex"));

/// Code constructs rejected in implementation artifacts.
const DEFAULT_FORBIDDEN: &[(&str, &str)] = &[
    ("no-eval", r"\beval\("),
    ("no-exec", r"\bexec\("),
    ("no-shell-out", r"\bos\.system\("),
    ("no-bare-except", r"(?m)^\s*except\s*:"),
    ("no-panic", r"\bpanic!\("),
];

pub struct ComplianceCheck {
    forbidden: Vec<(String, Regex)>,
}

impl Default for ComplianceCheck {
    fn default() -> Self {
        Self {
            forbidden: DEFAULT_FORBIDDEN
                .iter()
                .map(|(id, pattern)| {
                    (
                        id.to_string(),
                        Regex::new(pattern).expect("built-in pattern is valid"),
                    )
                })
                .collect(),
        }
    }
}

impl ComplianceCheck {
    /// Reject code matching `pattern`, reported under `id`.
    pub fn forbid(mut self, id: impl Into<String>, pattern: Regex) -> Self {
        self.forbidden.push((id.into(), pattern));
        self
    }

    fn code_checks(&self, text: &str) -> Vec<CheckResult> {
        let mut checks = vec![no_placeholders(text)];
        for (id, pattern) in &self.forbidden {
            checks.push(match pattern.find(text) {
                Some(hit) => CheckResult::fail(
                    id.as_str(),
                    format!("remove the forbidden construct '{}'", hit.as_str().trim()),
                ),
                None => CheckResult::pass(id.as_str()),
            });
        }
        checks
    }
}

fn spec_checks(artifact: &LoadedArtifact) -> Vec<CheckResult> {
    let text = &artifact.text;
    let mut checks = vec![no_placeholders(text)];

    // Requirements are declared in their own section; scenarios only cite them.
    let declarations = artifact
        .section("requirements")
        .map(|s| s.body.as_str())
        .unwrap_or(text);
    let requirement_lines: Vec<&str> = declarations
        .lines()
        .filter(|l| REQUIREMENT_ID.is_match(l))
        .collect();
    checks.push(if requirement_lines.is_empty() {
        CheckResult::fail(
            "requirements-use-must",
            "add numbered requirements (FR-001, ...) stated with MUST",
        )
    } else {
        let weak: Vec<String> = requirement_lines
            .iter()
            .filter(|line| !MUST.is_match(line))
            .flat_map(|line| requirement_ids(line))
            .collect();
        if weak.is_empty() {
            CheckResult::pass("requirements-use-must")
        } else {
            CheckResult::fail(
                "requirements-use-must",
                format!("state requirements {} with MUST", weak.join(", ")),
            )
        }
    });

    checks.push(if text.lines().any(|l| GIVEN_WHEN_THEN.is_match(l)) {
        CheckResult::pass("scenarios-given-when-then")
    } else {
        CheckResult::fail(
            "scenarios-given-when-then",
            "write acceptance scenarios as Given / When / Then",
        )
    });
    checks
}

fn plan_checks(artifact: &LoadedArtifact) -> Vec<CheckResult> {
    let text = &artifact.text;
    let mut checks = vec![no_placeholders(text)];

    let mut declared: Vec<&str> = Vec::new();
    let mut duplicates: Vec<&str> = Vec::new();
    for line in text.lines() {
        // A task is declared by the first id on a list item.
        let item = line.trim_start();
        if !(item.starts_with('-') || item.starts_with('*')) {
            continue;
        }
        if let Some(id) = TASK_ID.find(item) {
            if declared.contains(&id.as_str()) {
                duplicates.push(id.as_str());
            } else {
                declared.push(id.as_str());
            }
        }
    }

    checks.push(if declared.is_empty() {
        CheckResult::fail("numbered-tasks", "list tasks as items numbered T001, T002, ...")
    } else {
        CheckResult::pass("numbered-tasks")
    });
    checks.push(if duplicates.is_empty() {
        CheckResult::pass("unique-task-ids")
    } else {
        CheckResult::fail(
            "unique-task-ids",
            format!("task ids declared more than once: {}", duplicates.join(", ")),
        )
    });
    checks
}

impl DimensionCheck for ComplianceCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Compliance
    }

    fn applies_to(&self, _artifact_type: ArtifactType) -> bool {
        true
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Option<DimensionOutcome> {
        let checks = match ctx.artifact.artifact_type {
            ArtifactType::Specification => spec_checks(ctx.artifact),
            ArtifactType::Plan => plan_checks(ctx.artifact),
            ArtifactType::Code => self.code_checks(&ctx.artifact.text),
            // Without a rule set there is nothing to comply with.
            ArtifactType::Json => match (ctx.artifact.json.as_ref(), ctx.json_rules) {
                (Some(document), Some(rules)) => evaluate_rules(document, rules),
                _ => Vec::new(),
            },
        };
        DimensionOutcome::from_checks(checks)
    }
}
