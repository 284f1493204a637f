//! Building a `ContextSummary` from retrieval hits.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use temper_contracts::{
    agent::TaskId,
    context::{ContextSummary, DocumentKind},
    error::TemperResult,
};
use temper_core::{persist::save_context_summary, traits::StateStore};

use crate::retriever::{ContextRetriever, RetrievalResult};

const SUMMARY_CHARS: usize = 120;

/// Design patterns worth pointing out to a producer, by name.
static PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("retry-with-backoff", r"(?i)\bbackoff\b|\bretr(?:y|ies|ied)\b"),
        ("caching", r"(?i)\bcach(?:e|es|ed|ing)\b"),
        ("pagination", r"(?i)\bpaginat(?:e|ed|ion)\b|\bcursor\b"),
        ("authentication", r"(?i)\bauth(?:entication|orization)?\b|\btokens?\b|\blogin\b"),
        ("validation", r"(?i)\bvalidat(?:e|es|ed|ion)\b|\bschema\b"),
        ("state-machine", r"(?i)\bstate machine\b|\btransitions?\b"),
        ("event-driven", r"(?i)\bevents?\b.*\b(?:publish|subscribe|handler)s?\b"),
        ("repository", r"(?i)\brepository\b|\bdao\b"),
    ]
    .into_iter()
    .map(|(name, source)| (name, Regex::new(source).expect("valid regex")))
    .collect()
});

/// First non-empty line, heading markers stripped, cut at a char boundary.
fn one_line(text: &str) -> String {
    let line = text
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    if line.chars().count() <= SUMMARY_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(SUMMARY_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Assemble the summary for a finished search.
pub fn build_summary(result: &RetrievalResult) -> ContextSummary {
    let mut summary = ContextSummary {
        query: result.query.clone(),
        relevant_files: Vec::new(),
        file_summaries: BTreeMap::new(),
        detected_patterns: Vec::new(),
        dependency_map: BTreeMap::new(),
        related_specifications: Vec::new(),
        compliance_status: BTreeMap::new(),
        embedding: result.query_embedding.clone(),
        mode: result.mode.clone(),
    };

    for hit in &result.hits {
        let document = &hit.document;
        let locator = document.locator().to_string();
        if summary.relevant_files.contains(&locator) {
            continue;
        }
        summary.file_summaries.insert(locator.clone(), one_line(&document.text));
        if !document.depends_on.is_empty() {
            summary.dependency_map.insert(locator.clone(), document.depends_on.clone());
        }
        if let Some(status) = &document.compliance {
            summary.compliance_status.insert(locator.clone(), status.clone());
        }
        if document.kind == DocumentKind::Specification {
            summary.related_specifications.push(locator.clone());
        }
        summary.relevant_files.push(locator);
    }

    summary.detected_patterns = PATTERNS
        .iter()
        .filter(|(_, regex)| result.hits.iter().any(|h| regex.is_match(&h.document.text)))
        .map(|(name, _)| name.to_string())
        .collect();
    summary
}

impl ContextRetriever {
    /// Search, then summarize the hits.
    pub fn summarize(&self, query: &str, k: usize) -> TemperResult<ContextSummary> {
        let result = self.search(query, k)?;
        Ok(build_summary(&result))
    }

    /// `summarize`, persisting the summary under `task_id`.
    pub fn summarize_for_task(
        &self,
        store: &dyn StateStore,
        task_id: &TaskId,
        query: &str,
        k: usize,
    ) -> TemperResult<ContextSummary> {
        let summary = self.summarize(query, k)?;
        save_context_summary(store, task_id, &summary)?;
        debug!(task_id = %task_id, files = summary.relevant_files.len(), "context summary saved");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use temper_contracts::{
        agent::TaskId,
        context::{ContextDocument, DocumentKind, RetrievalMode},
    };
    use temper_core::{config::RetrievalConfig, persist::load_context_summary};
    use temper_store::InMemoryStore;

    use crate::embed::HashingEmbedder;
    use crate::retriever::ContextRetriever;

    use super::one_line;

    fn retriever() -> ContextRetriever {
        let retriever =
            ContextRetriever::new(Arc::new(HashingEmbedder::default()), RetrievalConfig::default()).unwrap();
        retriever
            .add_documents(vec![
                ContextDocument::new(
                    "spec-payments",
                    DocumentKind::Specification,
                    "# Payment retries\n\nFailed payments MUST be retried with exponential backoff.",
                )
                .with_path("specs/payments/spec.md")
                .with_compliance("compliant"),
                ContextDocument::new(
                    "code-retry",
                    DocumentKind::Code,
                    "fn retry_payment(id: PaymentId) {\n    // backoff between payment retry attempts\n}",
                )
                .with_path("src/payments/retry.rs")
                .with_dependencies(vec!["specs/payments/spec.md".to_string()]),
                ContextDocument::new("note-avatar", DocumentKind::Note, "Avatar uploads are resized."),
            ])
            .unwrap();
        retriever
    }

    #[test]
    fn test_summary_fields() {
        let summary = retriever().summarize("payment retry backoff", 2).unwrap();

        assert_eq!(summary.mode, RetrievalMode::Semantic);
        assert_eq!(summary.relevant_files.len(), 2);
        assert!(summary.relevant_files.contains(&"specs/payments/spec.md".to_string()));
        assert_eq!(summary.file_summaries["specs/payments/spec.md"], "Payment retries");
        assert_eq!(summary.related_specifications, vec!["specs/payments/spec.md"]);
        assert_eq!(summary.compliance_status["specs/payments/spec.md"], "compliant");
        assert_eq!(
            summary.dependency_map["src/payments/retry.rs"],
            vec!["specs/payments/spec.md".to_string()]
        );
        assert!(summary.detected_patterns.contains(&"retry-with-backoff".to_string()));
        assert_eq!(summary.embedding.map(|e| e.len()), Some(256));
    }

    #[test]
    fn test_summary_is_persisted() {
        let store = InMemoryStore::new();
        let task = TaskId::new("task-context");
        let summary = retriever()
            .summarize_for_task(&store, &task, "avatar", 1)
            .unwrap();

        assert_eq!(load_context_summary(&store, &task).unwrap(), Some(summary));
    }

    #[test]
    fn test_one_line_truncates() {
        assert_eq!(one_line("\n\n## Title  \nbody"), "Title");
        let long = "word ".repeat(40);
        let line = one_line(&long);
        assert!(line.ends_with("..."));
        assert!(line.chars().count() <= 123);
    }
}
