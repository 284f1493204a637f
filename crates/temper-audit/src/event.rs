//! Audit event and trail types.
//!
//! `AuditEvent` is a single entry in a task's hash chain: it wraps a
//! `DecisionRecord` with sequence numbering and the SHA-256 hashes that make
//! tampering detectable. `AuditTrail` is the exported chain of one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use temper_contracts::{agent::TaskId, record::DecisionRecord};

/// A single entry in the hash chain of one task.
///
/// Modifying any field, including those of the embedded `record`,
/// invalidates `this_hash` and every subsequent `prev_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the task's chain, starting at 0.
    pub sequence: u64,

    pub task_id: TaskId,

    pub record: DecisionRecord,

    /// Hash of the previous event, or `GENESIS_HASH` for the first one.
    pub prev_hash: String,

    /// Computed by `hash_event()` over (task_id, sequence, prev_hash,
    /// canonical JSON of record).
    pub this_hash: String,
}

impl AuditEvent {
    /// The `prev_hash` of the first event in every chain: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// Every event recorded for one task, in chain order.
///
/// `terminal_hash` is the `this_hash` of the last event and commits to the
/// whole trail. Empty when no event was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    pub task_id: TaskId,
    pub events: Vec<AuditEvent>,
    pub exported_at: DateTime<Utc>,
    pub terminal_hash: String,
}

impl AuditTrail {
    pub fn new(task_id: TaskId, events: Vec<AuditEvent>) -> Self {
        let terminal_hash = events
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();
        Self {
            task_id,
            events,
            exported_at: Utc::now(),
            terminal_hash,
        }
    }
}
