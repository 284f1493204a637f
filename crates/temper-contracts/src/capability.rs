//! Capability tokens used by the routing table.
//!
//! A route declares the capabilities its agent `provides` and `requires`.
//! The router derives execution order from these sets: an agent that
//! requires a capability runs after every selected agent that provides it.
//! Dispatch is a table lookup over these tokens, never reflection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An opaque capability token.
///
/// Names should be namespaced and descriptive:
/// e.g. "api:contract", "schema:database", "ui:components".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capability(pub String);

impl Capability {
    /// Construct a capability from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// An ordered set of capabilities.
///
/// Ordered: serialized routing decisions list capabilities stably.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    inner: BTreeSet<Capability>,
}

impl CapabilitySet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: names.into_iter().map(|n| Capability::new(n)).collect(),
        }
    }

    /// Return true if the set contains the given capability.
    pub fn has(&self, capability: &Capability) -> bool {
        self.inner.contains(capability)
    }

    /// Return true if any capability appears in both sets.
    pub fn intersects(&self, other: &CapabilitySet) -> bool {
        self.inner.iter().any(|c| other.has(c))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
