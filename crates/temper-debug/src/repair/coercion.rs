use std::sync::LazyLock;

use regex::{Captures, Regex};

use temper_contracts::debug::ErrorPattern;

use super::{join_lines, owned_lines, Repair, RepairContext, RepairStrategy};

static ADDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<left>[\w\.\[\]]+(?:\([^()]*\))?|'[^']*'|"[^"]*")\s*\+\s*(?P<right>[\w\.\[\]]+(?:\([^()]*\))?|'[^']*'|"[^"]*")"#,
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coercion {
    Str,
    Int,
}

impl Coercion {
    fn name(self) -> &'static str {
        match self {
            Coercion::Str => "str",
            Coercion::Int => "int",
        }
    }

    fn flipped(self) -> Self {
        match self {
            Coercion::Str => Coercion::Int,
            Coercion::Int => Coercion::Str,
        }
    }

    /// Whether `operand` needs wrapping under this coercion.
    fn applies_to(self, operand: &str) -> bool {
        let string_literal = operand.starts_with(['\'', '"']);
        let numeric_literal = operand.parse::<f64>().is_ok();
        let wrapped = operand.starts_with(&format!("{}(", self.name()));
        match self {
            Coercion::Str => !string_literal && !wrapped,
            Coercion::Int => !string_literal && !numeric_literal && !wrapped,
        }
    }
}

/// Wraps the operands of a mixed `str`/`int` addition in a conversion.
/// Later attempts alternate between the two conversions.
pub struct StrIntCoercion;

impl StrIntCoercion {
    fn preferred(message: &str) -> Coercion {
        if message.contains("unsupported operand") {
            Coercion::Int
        } else {
            Coercion::Str
        }
    }
}

impl RepairStrategy for StrIntCoercion {
    fn name(&self) -> &'static str {
        "str-int-coercion"
    }

    fn handles(&self, pattern: ErrorPattern) -> bool {
        pattern == ErrorPattern::Type
    }

    fn propose(&self, ctx: &RepairContext<'_>) -> Option<Repair> {
        let mut coercion = Self::preferred(ctx.error_message);
        if ctx.attempt % 2 == 0 {
            coercion = coercion.flipped();
        }

        let mut lines = owned_lines(ctx.code);
        let index = ctx
            .error_line()
            .filter(|i| ADDITION.is_match(&lines[*i]))
            .or_else(|| lines.iter().position(|l| ADDITION.is_match(l)))?;

        let mut wrapped = Vec::new();
        let line = ADDITION
            .replacen(&lines[index], 1, |c: &Captures<'_>| {
                let mut wrap = |operand: &str| {
                    if coercion.applies_to(operand) {
                        wrapped.push(operand.to_string());
                        format!("{}({operand})", coercion.name())
                    } else {
                        operand.to_string()
                    }
                };
                let left = wrap(&c["left"]);
                let right = wrap(&c["right"]);
                format!("{left} + {right}")
            })
            .into_owned();
        if wrapped.is_empty() {
            return None;
        }
        lines[index] = line;

        Some(Repair {
            code: join_lines(ctx.code, &lines),
            description: format!("convert {} with {}()", wrapped.join(" and "), coercion.name()),
            rationale: format!(
                "the addition mixed strings and integers; coercing to {} makes both sides agree",
                coercion.name()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use temper_contracts::debug::ErrorPattern;

    use super::super::{RepairContext, RepairStrategy};
    use super::StrIntCoercion;

    fn ctx<'a>(code: &'a str, message: &'a str, attempt: u32) -> RepairContext<'a> {
        RepairContext {
            code,
            error_message: message,
            stack_trace: "",
            pattern: ErrorPattern::Type,
            attempt,
        }
    }

    #[test]
    fn test_concatenation_wraps_in_str() {
        let code = "def label(total):\n    return 'total: ' + total\n";
        let message = "TypeError: can only concatenate str (not \"int\") to str";
        let repair = StrIntCoercion.propose(&ctx(code, message, 1)).unwrap();
        assert_eq!(repair.code, "def label(total):\n    return 'total: ' + str(total)\n");
    }

    #[test]
    fn test_unsupported_operand_prefers_int_then_alternates() {
        let code = "def bump(count):\n    return count + 1\n";
        let message = "TypeError: unsupported operand type(s) for +: 'str' and 'int'";

        let first = StrIntCoercion.propose(&ctx(code, message, 1)).unwrap();
        assert_eq!(first.code, "def bump(count):\n    return int(count) + 1\n");

        let second = StrIntCoercion.propose(&ctx(code, message, 2)).unwrap();
        assert_eq!(second.code, "def bump(count):\n    return str(count) + str(1)\n");
    }

    #[test]
    fn test_nothing_to_wrap() {
        let code = "x = str(a) + 'b'\n";
        let message = "TypeError: can only concatenate str (not \"int\") to str";
        assert!(StrIntCoercion.propose(&ctx(code, message, 1)).is_none());
        assert!(StrIntCoercion.propose(&ctx("x = 1\n", message, 1)).is_none());
    }
}
