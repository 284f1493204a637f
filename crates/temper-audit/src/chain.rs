//! Hash-chain primitives: hashing, linking, and integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. task_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. canonical JSON of record (serde_json, no pretty-printing)

use sha2::{Digest, Sha256};

use temper_contracts::{
    agent::TaskId,
    error::{TemperError, TemperResult},
    record::DecisionRecord,
};

use crate::event::AuditEvent;

/// Compute the SHA-256 hash for one event. Returns lowercase hex.
pub fn hash_event(
    task_id: &TaskId,
    sequence: u64,
    record: &DecisionRecord,
    prev_hash: &str,
) -> TemperResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| TemperError::AuditWriteFailed {
        reason: format!("decision record is not serializable: {e}"),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(task_id.as_str().as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of one task's chain.
///
/// Valid when every event links to its predecessor (`GENESIS_HASH` for the
/// first), carries the expected sequence number, belongs to the same task,
/// and its `this_hash` matches the hash recomputed from its own fields. An
/// empty chain is valid.
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    let mut expected_prev = AuditEvent::GENESIS_HASH.to_string();
    let task = events.first().map(|e| &e.task_id);

    for (index, event) in events.iter().enumerate() {
        if event.prev_hash != expected_prev
            || event.sequence != index as u64
            || Some(&event.task_id) != task
            || event.record.task_id != event.task_id
        {
            return false;
        }

        match hash_event(&event.task_id, event.sequence, &event.record, &event.prev_hash) {
            Ok(recomputed) if recomputed == event.this_hash => {}
            _ => return false,
        }

        expected_prev = event.this_hash.clone();
    }

    true
}

/// The tail of one task's chain: everything needed to link the next event.
#[derive(Debug, Clone)]
pub(crate) struct ChainHead {
    pub(crate) sequence: u64,
    pub(crate) last_hash: String,
}

impl Default for ChainHead {
    fn default() -> Self {
        Self {
            sequence: 0,
            last_hash: AuditEvent::GENESIS_HASH.to_string(),
        }
    }
}

impl ChainHead {
    /// The head after `events`, which must already be a verified chain.
    pub(crate) fn after(events: &[AuditEvent]) -> Self {
        match events.last() {
            Some(last) => Self {
                sequence: last.sequence + 1,
                last_hash: last.this_hash.clone(),
            },
            None => Self::default(),
        }
    }

    /// Build the next event without advancing the head.
    pub(crate) fn link(&self, record: &DecisionRecord) -> TemperResult<AuditEvent> {
        let this_hash = hash_event(&record.task_id, self.sequence, record, &self.last_hash)?;
        Ok(AuditEvent {
            sequence: self.sequence,
            task_id: record.task_id.clone(),
            record: record.clone(),
            prev_hash: self.last_hash.clone(),
            this_hash,
        })
    }

    /// Advance past an event produced by `link`.
    pub(crate) fn advance(&mut self, event: &AuditEvent) {
        self.sequence = event.sequence + 1;
        self.last_hash = event.this_hash.clone();
    }
}
