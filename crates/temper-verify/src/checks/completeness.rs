//! Completeness: are all the required parts present?

use std::sync::LazyLock;

use regex::Regex;

use temper_contracts::verify::{ArtifactType, Dimension, FieldRuleType};

use crate::artifact::LoadedArtifact;
use crate::checks::kebab;
use crate::dimension::{CheckContext, CheckResult, DimensionCheck, DimensionOutcome};
use crate::schema::resolve_path;

/// (label, case-insensitive title needle)
const SPEC_SECTIONS: &[(&str, &str)] = &[
    ("Overview", "overview"),
    ("User Scenarios", "user scenarios"),
    ("Requirements", "requirements"),
    ("Success Criteria", "success criteria"),
];

const PLAN_SECTIONS: &[(&str, &str)] = &[
    ("Summary", "summary"),
    ("Technical Context", "technical context"),
    ("Phases", "phase"),
    ("Tasks", "task"),
];

static STUB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)todo!\(|unimplemented!\(|NotImplementedError|^\s*\.\.\.\s*$")
        .expect("valid regex")
});

static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub\s+)?(?:async\s+)?(?:def|fn|class|struct|enum|function)\s+\w+")
        .expect("valid regex")
});

pub struct CompletenessCheck;

fn section_checks(artifact: &LoadedArtifact, required: &[(&str, &str)]) -> Vec<CheckResult> {
    required
        .iter()
        .map(|(label, needle)| {
            let id = kebab(label);
            match artifact.section(needle) {
                None => CheckResult::missing(id, format!("add a '## {label}' section")),
                Some(section) if section.body.is_empty() => CheckResult::fail(
                    id,
                    format!("section '{}' is empty; fill in the {label}", section.title),
                ),
                Some(_) => CheckResult::pass(id),
            }
        })
        .collect()
}

fn code_checks(text: &str) -> Vec<CheckResult> {
    if text.trim().is_empty() {
        return vec![CheckResult::missing("code", "the artifact contains no code")];
    }
    let mut checks = Vec::new();
    checks.push(match STUB.find(text) {
        Some(stub) => CheckResult::fail(
            "no-stubs",
            format!("replace the stub '{}' with a real implementation", stub.as_str().trim()),
        ),
        None => CheckResult::pass("no-stubs"),
    });
    checks.push(if DEFINITION.is_match(text) {
        CheckResult::pass("has-definitions")
    } else {
        CheckResult::fail("has-definitions", "no function or type definitions found")
    });
    checks
}

fn json_checks(ctx: &CheckContext<'_>) -> Vec<CheckResult> {
    let Some(document) = ctx.artifact.json.as_ref() else {
        return vec![CheckResult::missing("document", "the artifact holds no JSON document")];
    };
    let mut checks = vec![match document.as_object() {
        Some(object) if !object.is_empty() => CheckResult::pass("non-empty-document"),
        _ => CheckResult::fail("non-empty-document", "the JSON document must be a non-empty object"),
    }];

    let mut required: Vec<String> = Vec::new();
    if let Some(rules) = ctx.json_rules {
        if let Some(names) = rules.json_schema.get("required").and_then(|r| r.as_array()) {
            required.extend(names.iter().filter_map(|n| n.as_str()).map(str::to_string));
        }
        for rule in &rules.rules {
            if let FieldRuleType::RequiredField { field_path } = &rule.rule_type {
                if !required.contains(field_path) {
                    required.push(field_path.clone());
                }
            }
        }
    }
    for path in required {
        let id = format!("field-{}", kebab(&path));
        checks.push(match resolve_path(document, &path) {
            Some(_) => CheckResult::pass(id),
            None => CheckResult::missing(id, format!("add the required field '{path}'")),
        });
    }
    checks
}

impl DimensionCheck for CompletenessCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Completeness
    }

    fn applies_to(&self, _artifact_type: ArtifactType) -> bool {
        true
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Option<DimensionOutcome> {
        let checks = match ctx.artifact.artifact_type {
            ArtifactType::Specification => section_checks(ctx.artifact, SPEC_SECTIONS),
            ArtifactType::Plan => section_checks(ctx.artifact, PLAN_SECTIONS),
            ArtifactType::Code => code_checks(&ctx.artifact.text),
            ArtifactType::Json => json_checks(ctx),
        };
        DimensionOutcome::from_checks(checks)
    }
}
