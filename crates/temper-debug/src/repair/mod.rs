//! Rule-based repair strategies.
//!
//! A strategy looks at the failing code and the classified error and
//! proposes a whole new version of the code, or nothing. Strategies never
//! run the code themselves; the debug loop guards, applies, and tests
//! every proposal.

mod coercion;
mod guards;
mod names;
mod syntax;

use std::sync::LazyLock;

use regex::Regex;

use temper_contracts::debug::ErrorPattern;

pub use coercion::StrIntCoercion;
pub use guards::NoneGuard;
pub use names::{IdentifierTypo, ImportFix};
pub use syntax::{MissingColon, UnbalancedBrackets};

static LINE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bline (\d+)").expect("valid regex"));

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']+)'").expect("valid regex"));

/// What a strategy gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub code: &'a str,
    pub error_message: &'a str,
    pub stack_trace: &'a str,
    pub pattern: ErrorPattern,
    /// 1-based attempt number within the session.
    pub attempt: u32,
}

impl RepairContext<'_> {
    /// 0-based index of the code line the failure points at. The innermost
    /// (last) reference in the trace wins over one in the message.
    pub fn error_line(&self) -> Option<usize> {
        let count = self.code.lines().count();
        [self.stack_trace, self.error_message]
            .iter()
            .find_map(|text| {
                LINE_REF
                    .captures_iter(text)
                    .last()
                    .and_then(|c| c[1].parse::<usize>().ok())
            })
            .filter(|n| (1..=count).contains(n))
            .map(|n| n - 1)
    }

    /// Every `'quoted'` name in the error message, in order.
    pub fn quoted_names(&self) -> Vec<&str> {
        QUOTED
            .captures_iter(self.error_message)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }
}

/// A proposed change.
#[derive(Debug, Clone, PartialEq)]
pub struct Repair {
    pub code: String,
    pub description: String,
    pub rationale: String,
}

pub trait RepairStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn handles(&self, pattern: ErrorPattern) -> bool;

    fn propose(&self, ctx: &RepairContext<'_>) -> Option<Repair>;
}

/// The built-in strategies, in the order they are tried.
pub fn builtin_strategies() -> Vec<Box<dyn RepairStrategy>> {
    vec![
        Box::new(MissingColon),
        Box::new(UnbalancedBrackets),
        Box::new(ImportFix),
        Box::new(IdentifierTypo),
        Box::new(NoneGuard),
        Box::new(StrIntCoercion),
    ]
}

/// Levenshtein distance over chars.
pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}

/// The candidate closest to `target`, within `max` edits. Exact matches
/// are skipped; ties keep the first candidate.
pub(crate) fn closest<'c>(
    target: &str,
    candidates: impl IntoIterator<Item = &'c str>,
    max: usize,
) -> Option<&'c str> {
    let mut best: Option<(usize, &'c str)> = None;
    for candidate in candidates {
        if candidate == target {
            continue;
        }
        let distance = edit_distance(target, candidate);
        if distance <= max && best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, candidate));
        }
    }
    best.map(|(_, c)| c)
}

/// Rebuild `code` from `lines`, keeping a trailing newline if it had one.
pub(crate) fn join_lines(code: &str, lines: &[String]) -> String {
    let mut joined = lines.join("\n");
    if code.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

pub(crate) fn owned_lines(code: &str) -> Vec<String> {
    code.lines().map(str::to_string).collect()
}

/// Replace whole-word occurrences of `from` with `to`.
pub(crate) fn replace_word(text: &str, from: &str, to: &str) -> String {
    match Regex::new(&format!(r"\b{}\b", regex::escape(from))) {
        Ok(word) => word.replace_all(text, regex::NoExpand(to)).into_owned(),
        Err(_) => text.to_string(),
    }
}

pub(crate) fn indentation(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}
