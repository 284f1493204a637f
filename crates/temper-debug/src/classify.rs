//! Error taxonomy classifier.
//!
//! Rules are tried in order: first the exception type named in the message
//! or trace, then the shape of the message. Anything unrecognized is a
//! logic error.

use regex::Regex;

use temper_contracts::debug::ErrorPattern;

/// The classification of one failure, with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub pattern: ErrorPattern,
    /// `None` for the logic fallback.
    pub rule: Option<&'static str>,
}

struct Rule {
    name: &'static str,
    pattern: ErrorPattern,
    regex: Regex,
}

pub struct Classifier {
    rules: Vec<Rule>,
}

/// (rule name, pattern, regex). Order matters: `AttributeError` on `None`
/// must be tried before plain `AttributeError`.
const TYPE_RULES: &[(&str, ErrorPattern, &str)] = &[
    ("syntax-error", ErrorPattern::Syntax, r"\b(?:SyntaxError|IndentationError|TabError)\b"),
    ("attribute-on-none", ErrorPattern::AttributeNull, r"AttributeError: 'NoneType' object"),
    ("type-error", ErrorPattern::Type, r"\bTypeError\b"),
    ("import-error", ErrorPattern::Import, r"\b(?:ModuleNotFoundError|ImportError)\b"),
    ("name-error", ErrorPattern::Name, r"\b(?:NameError|UnboundLocalError)\b"),
    ("attribute-error", ErrorPattern::Name, r"\bAttributeError\b"),
    ("value-error", ErrorPattern::Value, r"\b(?:ValueError|KeyError|IndexError)\b"),
    ("assertion-error", ErrorPattern::Assertion, r"\bAssertionError\b"),
];

const SHAPE_RULES: &[(&str, ErrorPattern, &str)] = &[
    ("expected-token", ErrorPattern::Syntax, r"(?i)expected '.'|invalid syntax|unexpected (?:EOF|token)|was never closed|unmatched '.'"),
    ("null-access", ErrorPattern::AttributeNull, r"(?i)null pointer|of undefined|of null|on a None value"),
    ("operand-types", ErrorPattern::Type, r"(?i)can only concatenate|unsupported operand type|mismatched types"),
    ("missing-module", ErrorPattern::Import, r"(?i)no module named|cannot find module|unresolved import"),
    ("undefined-name", ErrorPattern::Name, r"(?i)is not defined|cannot find value|undeclared identifier"),
    ("invalid-value", ErrorPattern::Value, r"(?i)invalid literal|out of range"),
    ("assertion-failed", ErrorPattern::Assertion, r"(?i)assertion (?:failed|`left == right`)"),
];

impl Default for Classifier {
    fn default() -> Self {
        let rules = TYPE_RULES
            .iter()
            .chain(SHAPE_RULES)
            .map(|(name, pattern, source)| Rule {
                name: *name,
                pattern: *pattern,
                regex: Regex::new(source).expect("built-in classifier rule is valid"),
            })
            .collect();
        Self { rules }
    }
}

impl Classifier {
    pub fn classify(&self, error_message: &str, stack_trace: &str) -> Classification {
        for rule in &self.rules {
            if rule.regex.is_match(error_message) || rule.regex.is_match(stack_trace) {
                return Classification {
                    pattern: rule.pattern,
                    rule: Some(rule.name),
                };
            }
        }
        Classification {
            pattern: ErrorPattern::Logic,
            rule: None,
        }
    }
}
