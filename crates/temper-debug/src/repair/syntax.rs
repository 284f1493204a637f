use std::sync::LazyLock;

use regex::Regex;

use temper_contracts::debug::ErrorPattern;

use super::{join_lines, owned_lines, Repair, RepairContext, RepairStrategy};

static COMPOUND_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:if|elif|else|for|while|def|class|try|except|finally|with|async\s+def|async\s+for|async\s+with)\b")
        .expect("valid regex")
});

/// Appends the `:` a compound statement header is missing.
pub struct MissingColon;

fn lacks_colon(line: &str) -> bool {
    let trimmed = line.trim_end();
    COMPOUND_HEADER.is_match(line)
        && !trimmed.ends_with(':')
        && !trimmed.ends_with('\\')
        && !trimmed.ends_with(['(', '[', '{', ','])
}

impl RepairStrategy for MissingColon {
    fn name(&self) -> &'static str {
        "missing-colon"
    }

    fn handles(&self, pattern: ErrorPattern) -> bool {
        pattern == ErrorPattern::Syntax
    }

    fn propose(&self, ctx: &RepairContext<'_>) -> Option<Repair> {
        let mut lines = owned_lines(ctx.code);
        let index = ctx
            .error_line()
            .filter(|i| lacks_colon(&lines[*i]))
            .or_else(|| lines.iter().position(|l| lacks_colon(l)))?;
        lines[index] = format!("{}:", lines[index].trim_end());
        Some(Repair {
            code: join_lines(ctx.code, &lines),
            description: format!("append ':' to line {}", index + 1),
            rationale: "a compound statement header must end with a colon".to_string(),
        })
    }
}

/// Closes brackets left open on a line and drops closers that match
/// nothing.
pub struct UnbalancedBrackets;

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// The line with stray closers removed and missing closers appended, or
/// `None` if it was balanced.
fn balance(line: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut kept = String::with_capacity(line.len() + 2);
    let mut quote: Option<char> = None;
    let mut comment = "";
    let mut changed = false;

    for (at, c) in line.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            kept.push(c);
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                kept.push(c);
            }
            '#' => {
                comment = &line[at..];
                break;
            }
            '(' | '[' | '{' => {
                stack.push(c);
                kept.push(c);
            }
            ')' | ']' | '}' => {
                if stack.last().map(|o| closer_for(*o)) == Some(c) {
                    stack.pop();
                    kept.push(c);
                } else {
                    changed = true;
                }
            }
            _ => kept.push(c),
        }
    }
    if stack.is_empty() && !changed {
        return None;
    }

    let closers: String = stack.iter().rev().map(|o| closer_for(*o)).collect();
    let body = kept.trim_end();
    let fixed = match body.strip_suffix(':') {
        Some(head) => format!("{head}{closers}:"),
        None => format!("{body}{closers}"),
    };
    Some(if comment.is_empty() {
        fixed
    } else {
        format!("{fixed}  {comment}")
    })
}

impl RepairStrategy for UnbalancedBrackets {
    fn name(&self) -> &'static str {
        "unbalanced-brackets"
    }

    fn handles(&self, pattern: ErrorPattern) -> bool {
        pattern == ErrorPattern::Syntax
    }

    fn propose(&self, ctx: &RepairContext<'_>) -> Option<Repair> {
        let mut lines = owned_lines(ctx.code);
        let (index, fixed) = match ctx.error_line() {
            Some(i) => (i, balance(&lines[i])?),
            None => lines
                .iter()
                .enumerate()
                .find_map(|(i, l)| balance(l).map(|fixed| (i, fixed)))?,
        };
        lines[index] = fixed;
        Some(Repair {
            code: join_lines(ctx.code, &lines),
            description: format!("balance the brackets on line {}", index + 1),
            rationale: "every opening bracket needs a matching closer on the same line".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use temper_contracts::debug::ErrorPattern;

    use super::super::{RepairContext, RepairStrategy};
    use super::{balance, MissingColon, UnbalancedBrackets};

    fn ctx<'a>(code: &'a str, message: &'a str) -> RepairContext<'a> {
        RepairContext {
            code,
            error_message: message,
            stack_trace: "",
            pattern: ErrorPattern::Syntax,
            attempt: 1,
        }
    }

    #[test]
    fn test_missing_colon_on_reported_line() {
        let code = "def total(xs):\n    t = 0\n    for x in xs\n        t += x\n    return t\n";
        let repair = MissingColon
            .propose(&ctx(code, "SyntaxError: expected ':' (line 3)"))
            .unwrap();
        assert!(repair.code.contains("    for x in xs:\n"));
        assert!(repair.code.ends_with('\n'));
        assert_eq!(repair.description, "append ':' to line 3");
    }

    #[test]
    fn test_missing_colon_scans_without_a_line() {
        let repair = MissingColon.propose(&ctx("if ready\n    go()", "invalid syntax")).unwrap();
        assert_eq!(repair.code, "if ready:\n    go()");
        assert!(MissingColon.propose(&ctx("x = 1\n", "invalid syntax")).is_none());
    }

    #[test]
    fn test_balance() {
        assert_eq!(balance("print(len(xs)").as_deref(), Some("print(len(xs))"));
        assert_eq!(balance("if f(x:").as_deref(), Some("if f(x):"));
        assert_eq!(balance("x = [1, 2]]").as_deref(), Some("x = [1, 2]"));
        assert_eq!(balance("s = '(' + t"), None);
        assert_eq!(balance("ok(1)"), None);
        assert_eq!(balance("f(x  # call f").as_deref(), Some("f(x)  # call f"));
    }

    #[test]
    fn test_unbalanced_brackets_repair() {
        let repair = UnbalancedBrackets
            .propose(&ctx("x = 1\nprint(x\n", "SyntaxError: '(' was never closed (line 2)"))
            .unwrap();
        assert_eq!(repair.code, "x = 1\nprint(x)\n");
    }
}
