//! Alignment: does the artifact stay on topic with its source spec?
//!
//! Approximated by keyword overlap: the most frequent content words of the
//! source specification should reappear in the artifact.

use std::collections::{BTreeMap, BTreeSet};

use temper_contracts::verify::{ArtifactType, Dimension};

use crate::dimension::{CheckContext, CheckResult, DimensionCheck, DimensionOutcome};

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "before", "being", "both", "each", "from", "have",
    "into", "more", "must", "only", "other", "over", "should", "some", "such", "than",
    "that", "their", "them", "then", "there", "these", "they", "this", "those", "through",
    "under", "when", "where", "which", "while", "will", "with", "within", "without", "would",
    "your", "given",
];

pub struct AlignmentCheck {
    max_keywords: usize,
    stopwords: BTreeSet<&'static str>,
}

impl Default for AlignmentCheck {
    fn default() -> Self {
        Self {
            max_keywords: 30,
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4 && !w.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_lowercase)
}

impl AlignmentCheck {
    /// The source's most frequent content words; ties keep first-use order.
    fn keywords(&self, source: &str) -> Vec<String> {
        let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for (position, word) in words(source).enumerate() {
            if self.stopwords.contains(word.as_str()) {
                continue;
            }
            counts.entry(word).or_insert((0, position)).0 += 1;
        }
        let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|(_, (ca, pa)), (_, (cb, pb))| cb.cmp(ca).then(pa.cmp(pb)));
        ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(word, _)| word)
            .collect()
    }
}

impl DimensionCheck for AlignmentCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Alignment
    }

    fn applies_to(&self, _artifact_type: ArtifactType) -> bool {
        true
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Option<DimensionOutcome> {
        let keywords = self.keywords(ctx.source_spec?);
        if keywords.is_empty() {
            return None;
        }
        let present: BTreeSet<String> = words(&ctx.artifact.text).collect();
        let missing: Vec<&str> = keywords
            .iter()
            .filter(|k| !present.contains(*k))
            .map(String::as_str)
            .collect();
        let score = 1.0 - missing.len() as f64 / keywords.len() as f64;
        // A mostly aligned artifact still passes the check.
        let check = if score >= 0.8 {
            CheckResult::pass("on-topic")
        } else {
            let shown: Vec<&str> = missing.iter().take(5).copied().collect();
            CheckResult::fail(
                "on-topic",
                format!(
                    "address {} source topic(s) not mentioned, e.g. {}",
                    missing.len(),
                    shown.join(", ")
                ),
            )
        };
        Some(DimensionOutcome::with_score(score, vec![check]))
    }
}

#[cfg(test)]
mod tests {
    use temper_contracts::verify::{Artifact, ArtifactType};

    use crate::artifact::LoadedArtifact;
    use crate::dimension::{CheckContext, DimensionCheck};

    use super::AlignmentCheck;

    const SOURCE: &str = "Users authenticate with passwords. Sessions expire. \
                          Passwords are hashed. Sessions are stored server side.";

    fn score(text: &str, source: Option<&str>) -> Option<f64> {
        let loaded = LoadedArtifact::load(&Artifact::inline(ArtifactType::Plan, text)).unwrap();
        AlignmentCheck::default()
            .evaluate(&CheckContext {
                artifact: &loaded,
                source_spec: source,
                json_rules: None,
            })
            .map(|o| o.score)
    }

    #[test]
    fn test_keywords_ranked_by_frequency() {
        let keywords = AlignmentCheck::default().keywords(SOURCE);
        assert_eq!(&keywords[..2], ["passwords", "sessions"]);
        assert!(!keywords.contains(&"with".to_string()));
    }

    #[test]
    fn test_alignment_requires_a_source() {
        assert!(score("anything", None).is_none());
        assert!(score("anything", Some("a an of")).is_none());
    }

    #[test]
    fn test_overlap_scores() {
        let on_topic = "Users authenticate with passwords; passwords are hashed. \
                        Sessions expire and are stored server side.";
        assert_eq!(score(on_topic, Some(SOURCE)), Some(1.0));

        let off_topic = score("Render the dashboard charts.", Some(SOURCE)).unwrap();
        assert_eq!(off_topic, 0.0);
    }
}
