//! Built-in dimension checks.

pub mod alignment;
pub mod completeness;
pub mod compliance;
pub mod coverage;

use std::sync::LazyLock;

use regex::Regex;

pub use alignment::AlignmentCheck;
pub use completeness::CompletenessCheck;
pub use compliance::ComplianceCheck;
pub use coverage::CoverageCheck;

use crate::dimension::{CheckResult, DimensionCheck};

pub(crate) static REQUIREMENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:FR|NFR|REQ)-\d{3}\b").expect("valid regex"));

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bTODO\b|\bTBD\b|\bFIXME\b|\[NEEDS CLARIFICATION").expect("valid regex")
});

/// One of each built-in check.
pub fn builtin_checks() -> Vec<Box<dyn DimensionCheck>> {
    vec![
        Box::new(CompletenessCheck),
        Box::new(ComplianceCheck::default()),
        Box::new(CoverageCheck),
        Box::new(AlignmentCheck::default()),
    ]
}

/// Requirement ids (`FR-001`, `NFR-002`, `REQ-003`) in order of first use.
pub(crate) fn requirement_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for found in REQUIREMENT_ID.find_iter(text) {
        if !ids.iter().any(|id| id == found.as_str()) {
            ids.push(found.as_str().to_string());
        }
    }
    ids
}

pub(crate) fn no_placeholders(text: &str) -> CheckResult {
    let hits: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .filter(|(_, line)| PLACEHOLDER.is_match(line))
        .collect();
    match hits.first() {
        None => CheckResult::pass("no-placeholders"),
        Some((line, text)) => CheckResult::fail(
            "no-placeholders",
            format!(
                "resolve {} unresolved placeholder line(s), first at line {}: '{}'",
                hits.len(),
                line + 1,
                text.trim()
            ),
        ),
    }
}

/// `"User Scenarios"` → `"user-scenarios"`.
pub(crate) fn kebab(label: &str) -> String {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::{kebab, no_placeholders, requirement_ids};

    #[test]
    fn test_requirement_ids_deduplicated_in_order() {
        let ids = requirement_ids("FR-002 then FR-001, again FR-002 and NFR-010; FR-1 is not one");
        assert_eq!(ids, vec!["FR-002", "FR-001", "NFR-010"]);
    }

    #[test]
    fn test_placeholders_found() {
        assert!(no_placeholders("all settled").passed);
        let check = no_placeholders("ok\nAuth via [NEEDS CLARIFICATION: which IdP?]\nTBD");
        assert!(!check.passed);
        assert!(check.feedback.unwrap().contains("2 unresolved placeholder line(s), first at line 2"));
    }

    #[test]
    fn test_kebab() {
        assert_eq!(kebab("User Scenarios"), "user-scenarios");
        assert_eq!(kebab("Technical Context"), "technical-context");
    }
}
