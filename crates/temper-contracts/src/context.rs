//! Context retrieval types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What kind of prior artifact a corpus document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Specification,
    Plan,
    Decision,
    Code,
    Note,
}

/// A document in the retrieval corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    /// Unique id; re-indexing with the same id replaces the document.
    pub id: String,
    pub kind: DocumentKind,
    /// File the document came from, if any.
    pub path: Option<String>,
    pub text: String,
    /// Ids or paths this document depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Compliance verdict recorded for the document, e.g. "compliant".
    #[serde(default)]
    pub compliance: Option<String>,
}

impl ContextDocument {
    pub fn new(id: impl Into<String>, kind: DocumentKind, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            path: None,
            text: text.into(),
            depends_on: Vec::new(),
            compliance: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_compliance(mut self, status: impl Into<String>) -> Self {
        self.compliance = Some(status.into());
        self
    }

    /// The path if present, otherwise the id.
    pub fn locator(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.id)
    }
}

/// Which ranking produced a retrieval result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RetrievalMode {
    Semantic,
    KeywordFallback { reason: String },
}

/// Grounding context assembled for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub query: String,
    pub relevant_files: Vec<String>,
    /// File → one-line summary.
    pub file_summaries: BTreeMap<String, String>,
    pub detected_patterns: Vec<String>,
    /// File → what it depends on.
    pub dependency_map: BTreeMap<String, Vec<String>>,
    pub related_specifications: Vec<String>,
    /// File → compliance status.
    pub compliance_status: BTreeMap<String, String>,
    pub embedding: Option<Vec<f32>>,
    pub mode: RetrievalMode,
}
