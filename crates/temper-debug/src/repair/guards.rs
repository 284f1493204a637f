use regex::Regex;

use temper_contracts::debug::ErrorPattern;

use super::{indentation, join_lines, owned_lines, Repair, RepairContext, RepairStrategy};

/// Returns early when the receiver of a failing attribute access is `None`.
pub struct NoneGuard;

impl RepairStrategy for NoneGuard {
    fn name(&self) -> &'static str {
        "none-guard"
    }

    fn handles(&self, pattern: ErrorPattern) -> bool {
        pattern == ErrorPattern::AttributeNull
    }

    fn propose(&self, ctx: &RepairContext<'_>) -> Option<Repair> {
        let attribute = *ctx.quoted_names().last()?;
        let receiver = Regex::new(&format!(r"([A-Za-z_][\w\.]*)\.{}\b", regex::escape(attribute))).ok()?;

        let mut lines = owned_lines(ctx.code);
        let index = match ctx.error_line() {
            Some(index) => index,
            None => lines.iter().position(|l| receiver.is_match(l))?,
        };
        let line = lines.get(index)?;
        let variable = receiver.captures(line)?.get(1)?.as_str().to_string();
        let indent = indentation(line).to_string();
        // Top-level code has nothing to return from.
        if indent.is_empty() {
            return None;
        }

        let guard = format!("{indent}if {variable} is None:");
        if lines[index.saturating_sub(2)..index]
            .iter()
            .any(|l| l.trim_end() == guard)
        {
            return None;
        }
        lines.insert(index, format!("{indent}    return None"));
        lines.insert(index, guard);
        Some(Repair {
            code: join_lines(ctx.code, &lines),
            description: format!("return early when '{variable}' is None"),
            rationale: format!("'{variable}.{attribute}' was read while '{variable}' was None"),
        })
    }
}

#[cfg(test)]
mod tests {
    use temper_contracts::debug::ErrorPattern;

    use super::super::{RepairContext, RepairStrategy};
    use super::NoneGuard;

    const CODE: &str = "def greet(user):\n    name = user.name\n    return 'hi ' + name\n";
    const MESSAGE: &str = "AttributeError: 'NoneType' object has no attribute 'name'";

    fn ctx<'a>(code: &'a str, trace: &'a str) -> RepairContext<'a> {
        RepairContext {
            code,
            error_message: MESSAGE,
            stack_trace: trace,
            pattern: ErrorPattern::AttributeNull,
            attempt: 1,
        }
    }

    #[test]
    fn test_guard_inserted_before_failing_line() {
        let repair = NoneGuard
            .propose(&ctx(CODE, "File \"t.py\", line 2, in greet"))
            .unwrap();
        assert_eq!(
            repair.code,
            "def greet(user):\n    if user is None:\n        return None\n    name = user.name\n    return 'hi ' + name\n"
        );
    }

    #[test]
    fn test_line_found_without_trace() {
        let repair = NoneGuard.propose(&ctx(CODE, "")).unwrap();
        assert!(repair.code.contains("    if user is None:\n"));
    }

    #[test]
    fn test_existing_guard_and_top_level_skipped() {
        let guarded = "def greet(user):\n    if user is None:\n        return None\n    name = user.name\n";
        assert!(NoneGuard.propose(&ctx(guarded, "line 4")).is_none());

        assert!(NoneGuard.propose(&ctx("name = user.name\n", "line 1")).is_none());
    }
}
