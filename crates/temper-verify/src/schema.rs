//! Rule evaluation for structured (JSON) artifacts.
//!
//! Runs in two passes:
//!
//! 1. **Structural**: the document is validated against
//!    `JsonRuleSet::json_schema` with the `jsonschema` crate. A `Null`
//!    schema skips this pass.
//! 2. **Field rules**: each `FieldRule` is evaluated in order. Every failure
//!    is collected so the producer sees the whole list in one round.

use serde_json::Value;
use tracing::{debug, warn};

use temper_contracts::verify::{FieldRuleType, JsonRuleSet};

use crate::dimension::CheckResult;

/// Check id used for JSON Schema violations.
pub const SCHEMA_CHECK: &str = "json-schema";

/// Resolve a dot-notation path (`"plan.owner"`) against a JSON value.
/// Returns `None` when any segment is missing or the value is `null`.
pub fn resolve_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(v) if !v.is_null() => current = v,
            _ => return None,
        }
    }
    Some(current)
}

/// Evaluate `rules` against `document`, one `CheckResult` per schema pass
/// and per field rule.
pub fn evaluate_rules(document: &Value, rules: &JsonRuleSet) -> Vec<CheckResult> {
    let mut checks = Vec::new();

    if !rules.json_schema.is_null() {
        checks.push(match jsonschema::validator_for(&rules.json_schema) {
            Ok(validator) => {
                let violations: Vec<String> = validator
                    .iter_errors(document)
                    .map(|error| format!("schema violation at '{}': {error}", error.instance_path))
                    .collect();
                if violations.is_empty() {
                    CheckResult::pass(SCHEMA_CHECK)
                } else {
                    warn!(
                        rule_set_id = %rules.rule_set_id,
                        count = violations.len(),
                        "structural validation failed"
                    );
                    CheckResult::fail(SCHEMA_CHECK, violations.join("; "))
                }
            }
            Err(e) => {
                warn!(rule_set_id = %rules.rule_set_id, error = %e, "schema compilation failed");
                CheckResult::fail(SCHEMA_CHECK, format!("invalid JSON Schema document: {e}"))
            }
        });
    }

    for rule in &rules.rules {
        debug!(rule_id = %rule.rule_id, description = %rule.description, "evaluating field rule");
        let failure = match &rule.rule_type {
            FieldRuleType::RequiredField { field_path } => resolve_path(document, field_path)
                .is_none()
                .then(|| format!("required field '{field_path}' is missing or null")),
            FieldRuleType::AllowedValues {
                field_path,
                allowed,
            } => match resolve_path(document, field_path) {
                None => Some(format!(
                    "field '{field_path}' is missing; cannot check allowed values"
                )),
                Some(actual) if allowed.contains(actual) => None,
                Some(actual) => Some(format!(
                    "field '{field_path}' has value {actual} which is not in the allowed set"
                )),
            },
            // Absent or non-string fields have nothing to match against.
            FieldRuleType::ForbiddenPattern {
                field_path,
                pattern,
            } => resolve_path(document, field_path)
                .and_then(Value::as_str)
                .filter(|s| s.contains(pattern.as_str()))
                .map(|_| format!("field '{field_path}' contains forbidden pattern '{pattern}'")),
        };
        checks.push(match failure {
            None => CheckResult::pass(&rule.rule_id),
            Some(message) => {
                warn!(rule_id = %rule.rule_id, %message, "field rule failed");
                CheckResult::fail(&rule.rule_id, message)
            }
        });
    }

    checks
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use temper_contracts::verify::{FieldRule, FieldRuleType, JsonRuleSet};

    use super::{evaluate_rules, resolve_path};

    fn rule_set(json_schema: Value, rules: Vec<FieldRule>) -> JsonRuleSet {
        JsonRuleSet {
            rule_set_id: "routing-plan-v1".to_string(),
            json_schema,
            rules,
        }
    }

    fn rule(id: &str, rule_type: FieldRuleType) -> FieldRule {
        FieldRule {
            rule_id: id.to_string(),
            description: id.to_string(),
            rule_type,
        }
    }

    #[test]
    fn test_schema_pass_and_fail() {
        let schema = json!({
            "type": "object",
            "properties": { "mode": { "type": "string" } },
            "required": ["mode"]
        });

        let ok = evaluate_rules(&json!({ "mode": "dag" }), &rule_set(schema.clone(), vec![]));
        assert_eq!(ok.len(), 1);
        assert!(ok[0].passed);

        let bad = evaluate_rules(&json!({ "other": 1 }), &rule_set(schema, vec![]));
        assert!(!bad[0].passed);
        assert_eq!(bad[0].id, "json-schema");
    }

    #[test]
    fn test_invalid_schema_is_a_failure_not_a_panic() {
        let checks = evaluate_rules(&json!({}), &rule_set(json!({ "type": 12 }), vec![]));
        assert!(!checks[0].passed);
        assert!(checks[0].feedback.as_ref().unwrap().contains("invalid JSON Schema"));
    }

    #[test]
    fn test_field_rules() {
        let rules = rule_set(
            Value::Null,
            vec![
                rule(
                    "owner-present",
                    FieldRuleType::RequiredField {
                        field_path: "plan.owner".to_string(),
                    },
                ),
                rule(
                    "mode-allowed",
                    FieldRuleType::AllowedValues {
                        field_path: "mode".to_string(),
                        allowed: vec![json!("dag"), json!("parallel"), json!("sequential")],
                    },
                ),
                rule(
                    "no-secrets",
                    FieldRuleType::ForbiddenPattern {
                        field_path: "notes".to_string(),
                        pattern: "password".to_string(),
                    },
                ),
            ],
        );

        let checks = evaluate_rules(
            &json!({ "plan": { "owner": null }, "mode": "random", "notes": "password=hunter2" }),
            &rules,
        );
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(|c| !c.passed));

        let checks = evaluate_rules(
            &json!({ "plan": { "owner": "ops" }, "mode": "dag", "notes": 7 }),
            &rules,
        );
        assert!(checks.iter().all(|c| c.passed));
    }

    #[test]
    fn test_resolve_path_treats_null_as_missing() {
        let doc = json!({ "a": { "b": null, "c": 1 } });
        assert!(resolve_path(&doc, "a.b").is_none());
        assert_eq!(resolve_path(&doc, "a.c"), Some(&json!(1)));
        assert!(resolve_path(&doc, "a.d.e").is_none());
    }
}
