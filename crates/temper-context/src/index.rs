//! The retrieval corpus: documents, their embeddings, and an inverted
//! index scored with BM25.
//!
//! The index is updated in place. `upsert` and `remove` touch only the
//! postings of the document involved; nothing is ever rebuilt. Readers
//! share an `RwLock`, writers are serialized by it.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use temper_contracts::{
    context::ContextDocument,
    error::{TemperError, TemperResult},
};

use crate::embed::cosine;

pub const BM25_K1: f64 = 1.2;
pub const BM25_B: f64 = 0.75;

/// How many documents the semantic scan visits between cancel checks.
const CANCEL_STRIDE: usize = 512;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "of", "on", "or", "that", "the", "this", "to", "was", "with",
];

/// Lowercased alphanumeric words, stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: ContextDocument,
    pub score: f64,
}

/// A completed semantic scan.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticScan {
    pub hits: Vec<ScoredDocument>,
    /// Documents the scan could not rank because they have no embedding.
    pub unembedded: usize,
}

struct Entry {
    document: ContextDocument,
    embedding: Option<Vec<f32>>,
    terms: HashMap<String, u32>,
    length: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// term → document id → term frequency
    postings: HashMap<String, HashMap<String, u32>>,
    total_length: u64,
}

impl Inner {
    fn insert(&mut self, document: ContextDocument, embedding: Option<Vec<f32>>) {
        self.remove(&document.id);
        let tokens = tokenize(&document.text);
        let mut terms: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *terms.entry(token.clone()).or_insert(0) += 1;
        }
        for (term, frequency) in &terms {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(document.id.clone(), *frequency);
        }
        let length = tokens.len() as u64;
        self.total_length += length;
        self.entries.insert(
            document.id.clone(),
            Entry {
                document,
                embedding,
                terms,
                length,
            },
        );
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };
        for term in entry.terms.keys() {
            if let Some(posting) = self.postings.get_mut(term) {
                posting.remove(id);
                if posting.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_length -= entry.length;
        true
    }

    fn top_k(&self, mut scored: Vec<(&str, f64)>, k: usize) -> Vec<ScoredDocument> {
        scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            CmpOrdering::Equal => a.0.cmp(b.0),
            other => other,
        });
        scored
            .into_iter()
            .take(k)
            .filter_map(|(id, score)| {
                self.entries.get(id).map(|e| ScoredDocument {
                    document: e.document.clone(),
                    score,
                })
            })
            .collect()
    }
}

#[derive(Default)]
pub struct ContextIndex {
    inner: RwLock<Inner>,
}

impl ContextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `document`, replacing any document with the same id.
    pub fn upsert(&self, document: ContextDocument, embedding: Option<Vec<f32>>) -> TemperResult<()> {
        self.write()?.insert(document, embedding);
        Ok(())
    }

    /// Insert a batch under a single write lock.
    pub fn upsert_many(
        &self,
        batch: impl IntoIterator<Item = (ContextDocument, Option<Vec<f32>>)>,
    ) -> TemperResult<()> {
        let mut inner = self.write()?;
        for (document, embedding) in batch {
            inner.insert(document, embedding);
        }
        Ok(())
    }

    /// Returns whether a document was removed.
    pub fn remove(&self, id: &str) -> TemperResult<bool> {
        Ok(self.write()?.remove(id))
    }

    pub fn len(&self) -> TemperResult<usize> {
        Ok(self.read()?.entries.len())
    }

    pub fn is_empty(&self) -> TemperResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, id: &str) -> TemperResult<Option<ContextDocument>> {
        Ok(self.read()?.entries.get(id).map(|e| e.document.clone()))
    }

    /// Documents stored without an embedding, in id order.
    pub fn unembedded(&self) -> TemperResult<Vec<ContextDocument>> {
        let inner = self.read()?;
        let mut documents: Vec<_> = inner
            .entries
            .values()
            .filter(|e| e.embedding.is_none())
            .map(|e| e.document.clone())
            .collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(documents)
    }

    /// Store embeddings computed for documents returned by `unembedded`.
    /// A document replaced in the meantime keeps its own state. Returns how
    /// many embeddings were attached.
    pub fn attach_embeddings(
        &self,
        batch: impl IntoIterator<Item = (ContextDocument, Vec<f32>)>,
    ) -> TemperResult<usize> {
        let mut inner = self.write()?;
        let mut attached = 0;
        for (document, embedding) in batch {
            if let Some(entry) = inner.entries.get_mut(&document.id) {
                if entry.embedding.is_none() && entry.document.text == document.text {
                    entry.embedding = Some(embedding);
                    attached += 1;
                }
            }
        }
        Ok(attached)
    }

    /// Number of documents containing `term`.
    pub fn document_frequency(&self, term: &str) -> TemperResult<usize> {
        Ok(self.read()?.postings.get(term).map_or(0, HashMap::len))
    }

    /// BM25 ranking. Documents sharing no term with the query are left out.
    pub fn keyword_search(&self, query: &str, k: usize) -> TemperResult<Vec<ScoredDocument>> {
        let inner = self.read()?;
        let count = inner.entries.len() as f64;
        if count == 0.0 {
            return Ok(Vec::new());
        }
        let average_length = (inner.total_length as f64 / count).max(1.0);

        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let mut scores: HashMap<&str, f64> = HashMap::new();
        for term in &terms {
            let Some(posting) = inner.postings.get(term) else {
                continue;
            };
            let df = posting.len() as f64;
            let idf = (1.0 + (count - df + 0.5) / (df + 0.5)).ln();
            for (id, frequency) in posting {
                let Some(entry) = inner.entries.get(id) else {
                    continue;
                };
                let tf = f64::from(*frequency);
                let norm = 1.0 - BM25_B + BM25_B * entry.length as f64 / average_length;
                *scores.entry(id.as_str()).or_insert(0.0) += idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * norm);
            }
        }
        Ok(inner.top_k(scores.into_iter().collect(), k))
    }

    /// Cosine ranking against stored embeddings. Returns `None` as soon as
    /// `cancel` is observed.
    pub fn semantic_search(
        &self,
        query: &[f32],
        k: usize,
        cancel: &AtomicBool,
    ) -> TemperResult<Option<SemanticScan>> {
        let inner = self.read()?;
        let mut scored = Vec::with_capacity(inner.entries.len());
        let mut unembedded = 0;
        for (visited, (id, entry)) in inner.entries.iter().enumerate() {
            if visited % CANCEL_STRIDE == 0 && cancel.load(Ordering::Relaxed) {
                return Ok(None);
            }
            match &entry.embedding {
                Some(embedding) => scored.push((id.as_str(), f64::from(cosine(query, embedding)))),
                None => unembedded += 1,
            }
        }
        if cancel.load(Ordering::Relaxed) {
            return Ok(None);
        }
        Ok(Some(SemanticScan {
            hits: inner.top_k(scored, k),
            unembedded,
        }))
    }

    fn read(&self) -> TemperResult<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|e| TemperError::Store {
            reason: format!("context index lock poisoned: {e}"),
        })
    }

    fn write(&self) -> TemperResult<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|e| TemperError::Store {
            reason: format!("context index lock poisoned: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use temper_contracts::context::{ContextDocument, DocumentKind};

    use super::{tokenize, ContextIndex};

    fn doc(id: &str, text: &str) -> ContextDocument {
        ContextDocument::new(id, DocumentKind::Note, text)
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Retry the FAILED payment_job, twice!"), vec!["retry", "failed", "payment_job", "twice"]);
    }

    #[test]
    fn test_bm25_prefers_focused_documents() {
        let index = ContextIndex::new();
        index
            .upsert_many([
                (doc("a", "payment retry policy: retry failed payment with backoff"), None),
                (doc("b", "user profile page shows the avatar and the payment history among many other widgets"), None),
                (doc("c", "avatar upload resizing"), None),
            ])
            .unwrap();

        let hits = index.keyword_search("payment retry", 5).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_upsert_replaces_and_remove_updates_postings() {
        let index = ContextIndex::new();
        index.upsert(doc("a", "alpha beta"), None).unwrap();
        index.upsert(doc("b", "beta gamma"), None).unwrap();
        assert_eq!(index.document_frequency("beta").unwrap(), 2);

        index.upsert(doc("a", "delta"), None).unwrap();
        assert_eq!(index.len().unwrap(), 2);
        assert_eq!(index.document_frequency("alpha").unwrap(), 0);
        assert_eq!(index.document_frequency("beta").unwrap(), 1);

        assert!(index.remove("b").unwrap());
        assert!(!index.remove("b").unwrap());
        assert_eq!(index.document_frequency("beta").unwrap(), 0);
        assert!(index.keyword_search("beta", 3).unwrap().is_empty());
    }

    #[test]
    fn test_semantic_search_and_cancel() {
        let index = ContextIndex::new();
        index.upsert(doc("x", "x"), Some(vec![1.0, 0.0])).unwrap();
        index.upsert(doc("y", "y"), Some(vec![0.0, 1.0])).unwrap();
        index.upsert(doc("z", "no embedding"), None).unwrap();

        let scan = index
            .semantic_search(&[0.9, 0.1], 5, &AtomicBool::new(false))
            .unwrap()
            .unwrap();
        assert_eq!(scan.hits.len(), 2);
        assert_eq!(scan.hits[0].document.id, "x");
        assert_eq!(scan.unembedded, 1);

        let cancelled = index.semantic_search(&[1.0, 0.0], 5, &AtomicBool::new(true)).unwrap();
        assert!(cancelled.is_none());
    }

    #[test]
    fn test_attach_embeddings_skips_replaced_documents() {
        let index = ContextIndex::new();
        index.upsert(doc("a", "first draft"), None).unwrap();
        index.upsert(doc("b", "second note"), None).unwrap();

        let pending = index.unembedded().unwrap();
        assert_eq!(pending.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        index.upsert(doc("a", "rewritten draft"), None).unwrap();
        let attached = index
            .attach_embeddings(pending.into_iter().map(|d| (d, vec![1.0, 0.0])))
            .unwrap();

        assert_eq!(attached, 1);
        assert_eq!(index.unembedded().unwrap()[0].text, "rewritten draft");
    }
}
