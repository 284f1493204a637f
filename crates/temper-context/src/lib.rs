//! # temper-context
//!
//! Context retrieval for TEMPER.
//!
//! Prior specifications, plans, decisions and code are indexed twice: as
//! dense vectors from an `EmbeddingBackend`, and in an incremental BM25
//! keyword index. `ContextRetriever::search` ranks semantically within a
//! latency budget and falls back to keywords, with a logged reason, when
//! the semantic path is slow, failing or unavailable, or when part of the
//! corpus still has no embedding after a backfill attempt.
//! `ContextRetriever::summarize` turns the hits into a `ContextSummary`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use temper_context::{ContextRetriever, HashingEmbedder};
//!
//! let embedder = HashingEmbedder::new(config.retrieval.embedding_dimension)?;
//! let retriever = ContextRetriever::new(Arc::new(embedder), config.retrieval)?;
//! retriever.add_documents(corpus)?;
//! let summary = retriever.summarize("payment retry policy", config.retrieval.top_k)?;
//! ```

pub mod embed;
pub mod index;
pub mod retriever;
pub mod summary;

pub use embed::{EmbeddingBackend, HashingEmbedder};
pub use index::{ContextIndex, ScoredDocument, SemanticScan};
pub use retriever::{ContextRetriever, RetrievalResult};
pub use summary::build_summary;
