//! Fixed data for the reference runtime.
//!
//! Everything here is hardcoded and fictional. It stands in for the
//! language model, the test environment and the project history a real
//! deployment would plug in.

use std::sync::LazyLock;

use regex::Regex;

use temper_contracts::{
    context::{ContextDocument, DocumentKind},
    debug::TestOutcome,
    error::{TemperError, TemperResult},
};
use temper_core::TemperConfig;
use temper_debug::TestRunner;

const REFERENCE_CONFIG: &str = include_str!("../config/temper.toml");

/// The configuration every scenario runs with.
pub fn reference_config() -> TemperResult<TemperConfig> {
    TemperConfig::from_toml_str(REFERENCE_CONFIG)
}

// ── Login specification ──────────────────────────────────────────────────────

/// Sections of the login specification, in document order.
pub const LOGIN_SPEC_SECTIONS: &[(&str, &str)] = &[
    ("Overview", "Users log in with an email address and a password."),
    (
        "User Scenarios",
        "1. Given a registered user, when they submit valid credentials, then they reach the dashboard (FR-001).\n\
         2. Given an account with five failed attempts, when the user logs in again, then they see a lockout notice (FR-002).",
    ),
    (
        "Requirements",
        "- FR-001: The system MUST authenticate users by email and password.\n\
         - FR-002: The system MUST lock an account after five consecutive failed attempts.",
    ),
    ("Success Criteria", "- FR-001 and FR-002 are verified by acceptance tests."),
];

/// What a first, hurried draft contains.
pub const FIRST_DRAFT_SECTIONS: &[&str] = &["Overview", "Success Criteria"];

/// Render the login specification with only the `included` sections.
pub fn login_spec(included: &[&str]) -> String {
    let mut text = String::from("# Login\n");
    for (title, body) in LOGIN_SPEC_SECTIONS {
        if included.contains(title) {
            text.push_str(&format!("\n## {title}\n{body}\n"));
        }
    }
    text
}

// ── Code under repair ────────────────────────────────────────────────────────

/// An implementation with a missing colon on its first line.
pub const BROKEN_ADD: &str = "\
def add(a, b):
    return a + b


def test_add():
    for a, b, total in [(1, 2, 3), (2, 2, 4)]
        assert add(a, b) == total
";

static COMPOUND_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:if|elif|else|for|while|def|class|try|except|finally|with)\b").expect("valid regex")
});

/// A stand-in interpreter: reports a `SyntaxError` for the first compound
/// statement header without a trailing colon, and passes otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderCheckRunner;

impl TestRunner for HeaderCheckRunner {
    fn run(&self, code: &str) -> TemperResult<TestOutcome> {
        if code.trim().is_empty() {
            return Err(TemperError::InputContract {
                reason: "nothing to run".to_string(),
            });
        }
        for (index, line) in code.lines().enumerate() {
            if COMPOUND_HEADER.is_match(line) && !line.trim_end().ends_with(':') {
                return Ok(TestOutcome::Failed {
                    error_message: "SyntaxError: expected ':'".to_string(),
                    stack_trace: format!(
                        "  File \"add.py\", line {}\n    {}\n    ^",
                        index + 1,
                        line.trim()
                    ),
                });
            }
        }
        Ok(TestOutcome::Passed)
    }
}

// ── Project history ──────────────────────────────────────────────────────────

/// Prior artifacts of a fictional shop backend.
pub fn project_corpus() -> Vec<ContextDocument> {
    vec![
        ContextDocument::new(
            "spec-payments",
            DocumentKind::Specification,
            "# Payment retries\n\nFailed card payments MUST be retried with exponential backoff, at most five times.",
        )
        .with_path("specs/payments/spec.md")
        .with_compliance("compliant"),
        ContextDocument::new(
            "plan-payments",
            DocumentKind::Plan,
            "# Payment retry plan\n\nT001 add a retry queue. T002 schedule retries with backoff. T003 alert after the last retry.",
        )
        .with_path("specs/payments/plan.md")
        .with_dependencies(vec!["specs/payments/spec.md".to_string()]),
        ContextDocument::new(
            "code-retry",
            DocumentKind::Code,
            "fn schedule_retry(payment: &Payment, attempt: u32) -> Instant {\n    // exponential backoff for payment retry attempts\n}",
        )
        .with_path("src/payments/retry.rs")
        .with_dependencies(vec!["specs/payments/plan.md".to_string()]),
        ContextDocument::new(
            "spec-login",
            DocumentKind::Specification,
            "# Login\n\nUsers MUST authenticate with email and password; sessions use a refresh token.",
        )
        .with_path("specs/login/spec.md")
        .with_compliance("needs-review"),
        ContextDocument::new(
            "decision-cache",
            DocumentKind::Decision,
            "# Catalog cache\n\nThe product catalog is cached for five minutes; writes invalidate the cache.",
        )
        .with_path("decisions/0007-catalog-cache.md"),
        ContextDocument::new(
            "note-orders",
            DocumentKind::Note,
            "Order history uses cursor pagination with pages of fifty orders.",
        )
        .with_path("notes/orders.md"),
    ]
}

#[cfg(test)]
mod tests {
    use temper_contracts::debug::TestOutcome;
    use temper_debug::TestRunner;

    use super::*;

    #[test]
    fn test_reference_config_loads() {
        let config = reference_config().unwrap();
        assert_eq!(config.routes.len(), 5);
        assert_eq!(config.debug.max_iterations, 5);
    }

    #[test]
    fn test_login_spec_sections() {
        let draft = login_spec(FIRST_DRAFT_SECTIONS);
        assert!(draft.contains("## Overview"));
        assert!(!draft.contains("## Requirements"));

        let all: Vec<&str> = LOGIN_SPEC_SECTIONS.iter().map(|(t, _)| *t).collect();
        assert!(login_spec(&all).contains("FR-002: The system MUST"));
    }

    #[test]
    fn test_header_check_runner() {
        match HeaderCheckRunner.run(BROKEN_ADD).unwrap() {
            TestOutcome::Failed { stack_trace, .. } => assert!(stack_trace.contains("line 6")),
            other => panic!("expected failure, got {other:?}"),
        }
        let fixed = BROKEN_ADD.replacen("(2, 2, 4)]", "(2, 2, 4)]:", 1);
        assert_eq!(HeaderCheckRunner.run(&fixed).unwrap(), TestOutcome::Passed);
        assert!(HeaderCheckRunner.run("  ").is_err());
    }
}
