//! Scenario 4: Context lookup
//!
//! Before planning a change to payment retries, the planner asks for
//! grounding context. The project history is indexed with the hashing
//! embedder and searched semantically; the summary lists the relevant
//! files, their dependencies and compliance, and the patterns they use.
//!
//! The same lookup is then repeated with the embedding service offline:
//! the retriever logs the degradation and answers from the keyword index.

use std::sync::Arc;

use temper_context::{ContextRetriever, EmbeddingBackend, HashingEmbedder};
use temper_contracts::{
    agent::TaskId,
    context::ContextSummary,
    error::{TemperError, TemperResult},
};
use temper_core::persist::load_context_summary;
use temper_store::InMemoryStore;

use crate::mock_data::{project_corpus, reference_config};

const QUERY: &str = "payment retry backoff";

/// The embedding service while it is down.
struct OfflineEmbedder;

impl EmbeddingBackend for OfflineEmbedder {
    fn name(&self) -> &'static str {
        "embedding-service"
    }

    fn dimension(&self) -> usize {
        256
    }

    fn available(&self) -> bool {
        false
    }

    fn embed(&self, _text: &str) -> TemperResult<Vec<f32>> {
        Err(TemperError::AgentFailed {
            agent_id: self.name().to_string(),
            reason: "service offline".to_string(),
        })
    }
}

pub struct ContextLookupReport {
    pub semantic: ContextSummary,
    pub fallback: ContextSummary,
    /// Whether the semantic summary was saved for the planning task.
    pub persisted: bool,
}

pub fn run() -> TemperResult<ContextLookupReport> {
    let config = reference_config()?;
    let retrieval = config.retrieval;
    let store = InMemoryStore::new();
    let task_id = TaskId::generate();

    let embedder = HashingEmbedder::new(retrieval.embedding_dimension)?;
    let retriever = ContextRetriever::new(Arc::new(embedder), retrieval)?;
    retriever.add_documents(project_corpus())?;
    let semantic = retriever.summarize_for_task(&store, &task_id, QUERY, retrieval.top_k.min(3))?;
    let persisted = load_context_summary(&store, &task_id)?.is_some();

    let offline = ContextRetriever::new(Arc::new(OfflineEmbedder), retrieval)?;
    offline.add_documents(project_corpus())?;
    let fallback = offline.summarize(QUERY, retrieval.top_k.min(3))?;

    Ok(ContextLookupReport {
        semantic,
        fallback,
        persisted,
    })
}

fn print_summary(label: &str, summary: &ContextSummary) {
    println!("  {label} ({:?})", summary.mode);
    for file in &summary.relevant_files {
        let line = summary.file_summaries.get(file).map_or("", String::as_str);
        println!("    {file:<34} {line}");
        if let Some(deps) = summary.dependency_map.get(file) {
            println!("    {:<34} depends on {}", "", deps.join(", "));
        }
        if let Some(status) = summary.compliance_status.get(file) {
            println!("    {:<34} compliance: {status}", "");
        }
    }
    println!("    patterns: {}", summary.detected_patterns.join(", "));
    println!();
}

pub fn run_scenario() -> TemperResult<()> {
    println!("=== Scenario 4: Context lookup ===");
    println!();
    println!("  Query: \"{QUERY}\"");
    println!();

    let report = run()?;
    print_summary("Semantic", &report.semantic);
    print_summary("Embedding service offline", &report.fallback);
    Ok(())
}
