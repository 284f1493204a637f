//! Latency-budgeted retrieval.
//!
//! The semantic path (embed the query, scan the embeddings) runs on a
//! worker thread. The caller waits for it at most `latency_budget −
//! keyword_reserve`; the reserve is what the BM25 fallback gets. When the
//! semantic path times out, errors, or its backend is unavailable, the
//! worker is told to stop and the result is ranked by keywords instead,
//! with the reason carried in `RetrievalMode::KeywordFallback`.
//!
//! Documents indexed while the backend was down are embedded by the next
//! semantic search before it scans. A semantic ranking is only returned
//! when it covers the whole corpus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use temper_contracts::{
    context::{ContextDocument, RetrievalMode},
    error::{TemperError, TemperResult},
};
use temper_core::config::RetrievalConfig;

use crate::embed::EmbeddingBackend;
use crate::index::{ContextIndex, ScoredDocument, SemanticScan};

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub query: String,
    pub hits: Vec<ScoredDocument>,
    pub mode: RetrievalMode,
    /// The query vector, when the semantic path produced the ranking.
    pub query_embedding: Option<Vec<f32>>,
    pub elapsed: Duration,
}

type SemanticOutcome = TemperResult<Option<(Vec<f32>, SemanticScan)>>;

pub struct ContextRetriever {
    index: Arc<ContextIndex>,
    backend: Arc<dyn EmbeddingBackend>,
    config: RetrievalConfig,
}

impl ContextRetriever {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, config: RetrievalConfig) -> TemperResult<Self> {
        if config.keyword_reserve_ms >= config.latency_budget_ms {
            return Err(TemperError::Config {
                reason: format!(
                    "keyword reserve {} ms leaves nothing of the {} ms budget",
                    config.keyword_reserve_ms, config.latency_budget_ms
                ),
            });
        }
        Ok(Self {
            index: Arc::new(ContextIndex::new()),
            backend,
            config,
        })
    }

    /// Search an existing index instead of a fresh one.
    pub fn with_index(mut self, index: Arc<ContextIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn index(&self) -> &Arc<ContextIndex> {
        &self.index
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embed (when the backend is up) and index one document.
    pub fn add_document(&self, document: ContextDocument) -> TemperResult<()> {
        let embedding = embed_document(self.backend.as_ref(), &document);
        self.index.upsert(document, embedding)
    }

    /// Embed a batch in parallel, then index it under one write lock.
    pub fn add_documents(&self, documents: Vec<ContextDocument>) -> TemperResult<()> {
        let count = documents.len();
        let batch: Vec<_> = documents
            .into_par_iter()
            .map(|document| {
                let embedding = embed_document(self.backend.as_ref(), &document);
                (document, embedding)
            })
            .collect();
        self.index.upsert_many(batch)?;
        debug!(count, backend = self.backend.name(), "documents indexed");
        Ok(())
    }

    pub fn remove_document(&self, id: &str) -> TemperResult<bool> {
        self.index.remove(id)
    }

    /// The `k` most relevant documents for `query`.
    pub fn search(&self, query: &str, k: usize) -> TemperResult<RetrievalResult> {
        let started = Instant::now();
        if k == 0 {
            return Err(TemperError::InputContract {
                reason: "retrieval needs k of at least 1".to_string(),
            });
        }

        let semantic = match self.run_semantic(query, k) {
            Ok(Some((embedding, hits))) => Ok((embedding, hits)),
            Ok(None) => Err(format!(
                "semantic search exceeded {} ms",
                self.config.latency_budget_ms - self.config.keyword_reserve_ms
            )),
            Err(reason) => Err(reason),
        };

        let result = match semantic {
            Ok((embedding, hits)) => RetrievalResult {
                query: query.to_string(),
                hits,
                mode: RetrievalMode::Semantic,
                query_embedding: Some(embedding),
                elapsed: started.elapsed(),
            },
            Err(reason) => {
                warn!(backend = self.backend.name(), reason = %reason, "falling back to keyword retrieval");
                RetrievalResult {
                    query: query.to_string(),
                    hits: self.index.keyword_search(query, k)?,
                    mode: RetrievalMode::KeywordFallback { reason },
                    query_embedding: None,
                    elapsed: started.elapsed(),
                }
            }
        };
        info!(
            hits = result.hits.len(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            semantic = result.mode == RetrievalMode::Semantic,
            "retrieval finished"
        );
        Ok(result)
    }

    /// `Ok(None)` on timeout; `Err(reason)` when the semantic path cannot
    /// produce a ranking at all.
    fn run_semantic(&self, query: &str, k: usize) -> Result<Option<(Vec<f32>, Vec<ScoredDocument>)>, String> {
        if !self.backend.available() {
            return Err(format!("embedding backend '{}' is unavailable", self.backend.name()));
        }

        let wait = Duration::from_millis(self.config.latency_budget_ms - self.config.keyword_reserve_ms);
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<SemanticOutcome>();
        let worker = {
            let cancel = cancel.clone();
            let index = self.index.clone();
            let backend = self.backend.clone();
            let query = query.to_string();
            move || {
                let outcome = backend.embed(&query).and_then(|embedding| {
                    if embedding.len() != backend.dimension() {
                        return Err(TemperError::Config {
                            reason: format!(
                                "query embedding has {} dimensions, expected {}",
                                embedding.len(),
                                backend.dimension()
                            ),
                        });
                    }
                    backfill(&index, backend.as_ref(), &cancel)?;
                    if cancel.load(Ordering::Relaxed) {
                        return Ok(None);
                    }
                    Ok(index
                        .semantic_search(&embedding, k, &cancel)?
                        .map(|scan| (embedding, scan)))
                });
                // The caller may have stopped listening.
                let _ = tx.send(outcome);
            }
        };
        thread::Builder::new()
            .name("temper-semantic".to_string())
            .spawn(worker)
            .map_err(|e| format!("failed to start semantic worker: {e}"))?;

        match rx.recv_timeout(wait) {
            Ok(Ok(Some((_, scan)))) if scan.unembedded > 0 => Err(format!(
                "{} indexed documents have no embedding from '{}'",
                scan.unembedded,
                self.backend.name()
            )),
            Ok(Ok(Some((embedding, scan)))) => Ok(Some((embedding, scan.hits))),
            Ok(Ok(None)) => Ok(None),
            Ok(Err(e)) => Err(format!("embedding backend '{}' failed: {e}", self.backend.name())),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::Relaxed);
                Ok(None)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err("semantic worker exited without a result".to_string())
            }
        }
    }
}

/// `None` when the backend is down or returns an unusable vector.
fn embed_document(backend: &dyn EmbeddingBackend, document: &ContextDocument) -> Option<Vec<f32>> {
    if !backend.available() {
        return None;
    }
    match backend.embed(&document.text) {
        Ok(vector) if vector.len() == backend.dimension() => Some(vector),
        Ok(vector) => {
            warn!(
                id = %document.id,
                expected = backend.dimension(),
                got = vector.len(),
                "embedding has the wrong dimension, indexing for keywords only"
            );
            None
        }
        Err(e) => {
            warn!(id = %document.id, error = %e, "embedding failed, indexing for keywords only");
            None
        }
    }
}

/// Embed the documents that were indexed without a vector.
fn backfill(index: &ContextIndex, backend: &dyn EmbeddingBackend, cancel: &AtomicBool) -> TemperResult<()> {
    let pending = index.unembedded()?;
    if pending.is_empty() {
        return Ok(());
    }
    let batch: Vec<_> = pending
        .into_par_iter()
        .filter(|_| !cancel.load(Ordering::Relaxed))
        .filter_map(|document| embed_document(backend, &document).map(|vector| (document, vector)))
        .collect();
    let attached = index.attach_embeddings(batch)?;
    debug!(attached, backend = backend.name(), "backfilled missing embeddings");
    Ok(())
}
