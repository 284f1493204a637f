//! Keeps repairs from editing the expectations they are meant to satisfy.

use std::collections::BTreeMap;

use temper_contracts::error::{TemperError, TemperResult};

const EXPECTATION_MARKERS: &[&str] = &["assert ", "assert(", "assert_eq!", "assert_ne!", "assert!(", ".expect("];

#[derive(Debug, Default, Clone, Copy)]
pub struct ExpectationGuard;

impl ExpectationGuard {
    fn expectations(code: &str) -> BTreeMap<&str, usize> {
        let mut found = BTreeMap::new();
        for line in code.lines().map(str::trim) {
            if EXPECTATION_MARKERS.iter().any(|m| line.contains(m)) {
                *found.entry(line).or_insert(0) += 1;
            }
        }
        found
    }

    /// Reject `repaired` if it adds, removes or edits any assertion in
    /// `original`.
    pub fn check(&self, original: &str, repaired: &str) -> TemperResult<()> {
        let before = Self::expectations(original);
        let after = Self::expectations(repaired);
        if before == after {
            return Ok(());
        }
        let changed: Vec<&str> = before
            .keys()
            .filter(|line| before.get(*line) != after.get(*line))
            .chain(after.keys().filter(|line| !before.contains_key(*line)))
            .copied()
            .collect();
        Err(TemperError::InputContract {
            reason: format!("repair modifies test expectations: {}", changed.join(" | ")),
        })
    }
}
