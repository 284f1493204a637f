use std::sync::LazyLock;

use regex::Regex;

use temper_contracts::debug::ErrorPattern;

use super::{closest, join_lines, owned_lines, replace_word, Repair, RepairContext, RepairStrategy};

/// Modules an import may plausibly have meant.
const KNOWN_MODULES: &[&str] = &[
    "os", "sys", "re", "json", "math", "time", "random", "string", "typing", "pathlib",
    "datetime", "collections", "itertools", "functools", "subprocess", "logging", "unittest",
    "dataclasses", "numpy", "pandas", "requests", "yaml",
];

const BUILTINS: &[&str] = &[
    "print", "len", "range", "str", "int", "float", "list", "dict", "set", "tuple", "sum",
    "min", "max", "sorted", "enumerate", "zip", "isinstance", "open", "abs", "round",
];

static IMPORT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:import|from)\s").expect("valid regex"));

static DEFINITIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)\b([A-Za-z_]\w*)\s*(?:=[^=]|\+=|-=)|\b(?:def|class)\s+([A-Za-z_]\w*)|\bfor\s+([A-Za-z_]\w*)\s+in\b|\bimport\s+([A-Za-z_]\w*)|\bas\s+([A-Za-z_]\w*)",
    )
    .expect("valid regex")
});

static PARAMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdef\s+\w+\s*\(([^)]*)\)").expect("valid regex"));

static ATTRIBUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bself\.([A-Za-z_]\w*)\s*=|\bdef\s+([A-Za-z_]\w*)").expect("valid regex")
});

/// Fixes misspelled module names and adds imports for known modules used
/// without one.
pub struct ImportFix;

impl ImportFix {
    fn fix_module_name(&self, ctx: &RepairContext<'_>) -> Option<Repair> {
        let wanted = ctx.quoted_names().into_iter().next()?;
        let root = wanted.split('.').next().unwrap_or(wanted);
        let module = closest(root, KNOWN_MODULES.iter().copied(), 2)?;
        let lines: Vec<String> = owned_lines(ctx.code)
            .into_iter()
            .map(|l| {
                if IMPORT_LINE.is_match(&l) {
                    replace_word(&l, root, module)
                } else {
                    l
                }
            })
            .collect();
        let code = join_lines(ctx.code, &lines);
        (code != ctx.code).then(|| Repair {
            code,
            description: format!("import '{module}' instead of '{root}'"),
            rationale: format!("'{root}' does not exist; '{module}' is the closest known module"),
        })
    }

    fn add_missing_import(&self, ctx: &RepairContext<'_>) -> Option<Repair> {
        let name = ctx.quoted_names().into_iter().next()?;
        if !KNOWN_MODULES.contains(&name) {
            return None;
        }
        let mut lines = owned_lines(ctx.code);
        let after = lines
            .iter()
            .rposition(|l| IMPORT_LINE.is_match(l) && !l.starts_with(char::is_whitespace))
            .map_or(0, |i| i + 1);
        lines.insert(after, format!("import {name}"));
        Some(Repair {
            code: join_lines(ctx.code, &lines),
            description: format!("add 'import {name}'"),
            rationale: format!("'{name}' is a module that was used without being imported"),
        })
    }
}

impl RepairStrategy for ImportFix {
    fn name(&self) -> &'static str {
        "import-fix"
    }

    fn handles(&self, pattern: ErrorPattern) -> bool {
        matches!(pattern, ErrorPattern::Import | ErrorPattern::Name)
    }

    fn propose(&self, ctx: &RepairContext<'_>) -> Option<Repair> {
        match ctx.pattern {
            ErrorPattern::Import => self.fix_module_name(ctx),
            _ => self.add_missing_import(ctx),
        }
    }
}

/// Replaces an undefined name or attribute with the closest defined one.
pub struct IdentifierTypo;

fn defined_names(code: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for captures in DEFINITIONS.captures_iter(code) {
        if let Some(name) = captures.iter().skip(1).flatten().next() {
            names.push(name.as_str());
        }
    }
    for captures in PARAMS.captures_iter(code) {
        for param in captures.get(1).map_or("", |m| m.as_str()).split(',') {
            let param = param.split([':', '=']).next().unwrap_or_default().trim();
            let param = param.trim_start_matches('*');
            if !param.is_empty() {
                names.push(param);
            }
        }
    }
    names.extend(BUILTINS.iter().copied());
    names.dedup();
    names
}

impl RepairStrategy for IdentifierTypo {
    fn name(&self) -> &'static str {
        "identifier-typo"
    }

    fn handles(&self, pattern: ErrorPattern) -> bool {
        pattern == ErrorPattern::Name
    }

    fn propose(&self, ctx: &RepairContext<'_>) -> Option<Repair> {
        let quoted = ctx.quoted_names();
        if ctx.error_message.contains("has no attribute") {
            let wrong = *quoted.last()?;
            let attributes: Vec<&str> = ATTRIBUTES
                .captures_iter(ctx.code)
                .filter_map(|c| c.iter().skip(1).flatten().next().map(|m| m.as_str()))
                .collect();
            let right = closest(wrong, attributes, 2)?;
            let code = ctx
                .code
                .replace(&format!(".{wrong}"), &format!(".{right}"));
            return Some(Repair {
                code,
                description: format!("rename attribute '.{wrong}' to '.{right}'"),
                rationale: format!("'{wrong}' is not defined; '{right}' is the closest attribute"),
            });
        }

        let wrong = *quoted.first()?;
        // Short names have too many near neighbours to guess safely.
        let budget = if wrong.chars().count() <= 4 { 1 } else { 2 };
        let right = closest(wrong, defined_names(ctx.code), budget)?;
        Some(Repair {
            code: replace_word(ctx.code, wrong, right),
            description: format!("rename '{wrong}' to '{right}'"),
            rationale: format!("'{wrong}' is not defined; '{right}' is the closest defined name"),
        })
    }
}

#[cfg(test)]
mod tests {
    use temper_contracts::debug::ErrorPattern;

    use super::super::{RepairContext, RepairStrategy};
    use super::{defined_names, IdentifierTypo, ImportFix};

    fn ctx<'a>(code: &'a str, message: &'a str, pattern: ErrorPattern) -> RepairContext<'a> {
        RepairContext {
            code,
            error_message: message,
            stack_trace: "",
            pattern,
            attempt: 1,
        }
    }

    #[test]
    fn test_misspelled_module() {
        let code = "import jsno\n\nprint(jsno.dumps({}))\n";
        let repair = ImportFix
            .propose(&ctx(code, "ModuleNotFoundError: No module named 'jsno'", ErrorPattern::Import))
            .unwrap();
        // Only import lines are touched; the usage is a separate name error.
        assert_eq!(repair.code, "import json\n\nprint(jsno.dumps({}))\n");
    }

    #[test]
    fn test_missing_import_added_after_existing_imports() {
        let code = "import os\n\ndef load(p):\n    return json.load(open(p))\n";
        let repair = ImportFix
            .propose(&ctx(code, "NameError: name 'json' is not defined", ErrorPattern::Name))
            .unwrap();
        assert_eq!(repair.code, "import os\nimport json\n\ndef load(p):\n    return json.load(open(p))\n");

        let unknown = ImportFix.propose(&ctx(code, "NameError: name 'conut' is not defined", ErrorPattern::Name));
        assert!(unknown.is_none());
    }

    #[test]
    fn test_identifier_typo() {
        let code = "def tally(items, *, start=0):\n    count = start\n    for item in items:\n        count += 1\n    return conut\n";
        let repair = IdentifierTypo
            .propose(&ctx(code, "NameError: name 'conut' is not defined", ErrorPattern::Name))
            .unwrap();
        assert!(repair.code.ends_with("    return count\n"));
        assert!(defined_names(code).contains(&"items"));
        assert!(defined_names(code).contains(&"start"));
    }

    #[test]
    fn test_attribute_typo() {
        let code = "class User:\n    def __init__(self, name):\n        self.name = name\n\nprint(User('a').nmae)\n";
        let repair = IdentifierTypo
            .propose(&ctx(code, "AttributeError: 'User' object has no attribute 'nmae'", ErrorPattern::Name))
            .unwrap();
        assert!(repair.code.contains("User('a').name)"));
    }
}
