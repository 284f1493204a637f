//! Coverage: is everything that should be traced or tested covered?

use std::sync::LazyLock;

use regex::Regex;

use temper_contracts::verify::{ArtifactType, Dimension};

use crate::artifact::LoadedArtifact;
use crate::checks::{kebab, requirement_ids};
use crate::dimension::{CheckContext, CheckResult, DimensionCheck, DimensionOutcome};

static FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([a-z]+\))?\s+)?(?:async\s+)?(?:def|fn|function)\s+(\w+)")
        .expect("valid regex")
});

static TEST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#\[(?:tokio::)?test\]").expect("valid regex"));

pub struct CoverageCheck;

/// Every requirement a spec declares must show up again in its scenarios or
/// success criteria.
fn spec_coverage(artifact: &LoadedArtifact) -> DimensionOutcome {
    let ids = requirement_ids(&artifact.text);
    if ids.is_empty() {
        return DimensionOutcome::with_score(
            0.0,
            vec![CheckResult::fail(
                "requirements-traced",
                "declare numbered requirements so they can be traced to scenarios or success criteria",
            )],
        );
    }
    let tracing_text: String = ["user scenarios", "success criteria"]
        .iter()
        .filter_map(|needle| artifact.section(needle))
        .map(|s| s.body.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let traced = requirement_ids(&tracing_text);

    let checks = ids
        .iter()
        .map(|id| {
            let check_id = format!("traced-{}", kebab(id));
            if traced.contains(id) {
                CheckResult::pass(check_id)
            } else {
                CheckResult::fail(
                    check_id,
                    format!("reference {id} from a user scenario or success criterion"),
                )
            }
        })
        .collect();
    DimensionOutcome::from_checks(checks).unwrap_or_else(|| DimensionOutcome::with_score(0.0, vec![]))
}

/// A plan must reference every requirement of the spec it implements.
fn plan_coverage(artifact: &LoadedArtifact, source_spec: Option<&str>) -> Option<DimensionOutcome> {
    let wanted = requirement_ids(source_spec?);
    let referenced = requirement_ids(&artifact.text);
    let checks = wanted
        .iter()
        .map(|id| {
            let check_id = format!("covers-{}", kebab(id));
            if referenced.contains(id) {
                CheckResult::pass(check_id)
            } else {
                CheckResult::fail(check_id, format!("add a task that implements {id}"))
            }
        })
        .collect();
    DimensionOutcome::from_checks(checks)
}

/// Ratio of tests to the functions they exercise, capped at 1.
fn code_coverage(text: &str) -> Option<DimensionOutcome> {
    let names: Vec<&str> = FUNCTION
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    let named_tests = names.iter().filter(|n| n.starts_with("test")).count();
    let tests = named_tests.max(TEST_MARKER.find_iter(text).count());
    let functions = names.len().saturating_sub(tests);
    if functions == 0 {
        return None;
    }
    let score = (tests as f64 / functions as f64).min(1.0);
    let check = if tests >= functions {
        CheckResult::pass("tests-present")
    } else {
        CheckResult::fail(
            "tests-present",
            format!("add tests: {tests} test(s) for {functions} function(s)"),
        )
    };
    Some(DimensionOutcome::with_score(score, vec![check]))
}

impl DimensionCheck for CoverageCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Coverage
    }

    fn applies_to(&self, artifact_type: ArtifactType) -> bool {
        artifact_type != ArtifactType::Json
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Option<DimensionOutcome> {
        match ctx.artifact.artifact_type {
            ArtifactType::Specification => Some(spec_coverage(ctx.artifact)),
            ArtifactType::Plan => plan_coverage(ctx.artifact, ctx.source_spec),
            ArtifactType::Code => code_coverage(&ctx.artifact.text),
            ArtifactType::Json => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use temper_contracts::verify::{Artifact, ArtifactType};

    use crate::artifact::LoadedArtifact;
    use crate::dimension::{CheckContext, DimensionCheck, DimensionOutcome};

    use super::CoverageCheck;

    fn run(artifact_type: ArtifactType, text: &str, source: Option<&str>) -> Option<DimensionOutcome> {
        let loaded = LoadedArtifact::load(&Artifact::inline(artifact_type, text)).unwrap();
        CoverageCheck.evaluate(&CheckContext {
            artifact: &loaded,
            source_spec: source,
            json_rules: None,
        })
    }

    #[test]
    fn test_spec_without_requirements_scores_zero() {
        let outcome = run(ArtifactType::Specification, "## Overview\nstuff\n", None).unwrap();
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.violated, vec!["requirements-traced"]);
    }

    #[test]
    fn test_spec_traces_requirements() {
        let spec = "## Requirements\n- FR-001 MUST a\n- FR-002 MUST b\n\
                    ## Success Criteria\n- FR-001 holds under load\n";
        let outcome = run(ArtifactType::Specification, spec, None).unwrap();
        assert_eq!(outcome.score, 0.5);
        assert_eq!(outcome.violated, vec!["traced-fr-002"]);
    }

    #[test]
    fn test_plan_coverage_needs_a_source() {
        assert!(run(ArtifactType::Plan, "- T001 FR-001", None).is_none());
        assert!(run(ArtifactType::Plan, "- T001", Some("no ids here")).is_none());

        let outcome = run(ArtifactType::Plan, "- T001 implements FR-001", Some("FR-001 FR-002")).unwrap();
        assert_eq!(outcome.score, 0.5);
        assert_eq!(outcome.violated, vec!["covers-fr-002"]);
    }

    #[test]
    fn test_code_test_ratio() {
        let code = "def add(a, b):\n    return a + b\n\ndef sub(a, b):\n    return a - b\n\n\
                    def test_add():\n    assert add(1, 2) == 3\n";
        let outcome = run(ArtifactType::Code, code, None).unwrap();
        assert_eq!(outcome.score, 0.5);

        let rust = "pub fn add(a: i32, b: i32) -> i32 { a + b }\n#[test]\nfn adds() { assert_eq!(add(1, 2), 3); }\n";
        assert_eq!(run(ArtifactType::Code, rust, None).unwrap().score, 1.0);

        assert!(run(ArtifactType::Code, "x = 1\n", None).is_none());
    }
}
