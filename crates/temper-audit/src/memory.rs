//! In-memory implementation of `DecisionLog`.
//!
//! Keeps one hash chain per task in a map behind a `Mutex`. Cloning the log
//! shares the chains, so a test or a scenario can hand one clone to the
//! components and inspect another.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use temper_contracts::{
    agent::TaskId,
    error::{TemperError, TemperResult},
    record::DecisionRecord,
};
use temper_core::traits::DecisionLog;

use crate::{
    chain::{verify_chain, ChainHead},
    event::{AuditEvent, AuditTrail},
};

#[derive(Default)]
pub(crate) struct TaskChain {
    pub(crate) events: Vec<AuditEvent>,
    pub(crate) head: ChainHead,
}

#[derive(Clone, Default)]
pub struct InMemoryDecisionLog {
    pub(crate) chains: Arc<Mutex<BTreeMap<TaskId, TaskChain>>>,
}

impl InMemoryDecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export the trail of `task_id`. Empty when nothing was recorded.
    pub fn export_trail(&self, task_id: &TaskId) -> TemperResult<AuditTrail> {
        let chains = self.lock()?;
        let events = chains
            .get(task_id)
            .map(|c| c.events.clone())
            .unwrap_or_default();
        Ok(AuditTrail::new(task_id.clone(), events))
    }

    /// Check the chain of `task_id` has not been tampered with in memory.
    pub fn verify_integrity(&self, task_id: &TaskId) -> TemperResult<bool> {
        let chains = self.lock()?;
        Ok(chains.get(task_id).map_or(true, |c| verify_chain(&c.events)))
    }

    pub fn tasks(&self) -> TemperResult<Vec<TaskId>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn lock(&self) -> TemperResult<std::sync::MutexGuard<'_, BTreeMap<TaskId, TaskChain>>> {
        self.chains.lock().map_err(|e| TemperError::AuditWriteFailed {
            reason: format!("decision log lock poisoned: {e}"),
        })
    }
}

impl DecisionLog for InMemoryDecisionLog {
    fn append(&self, record: &DecisionRecord) -> TemperResult<()> {
        let mut chains = self.lock()?;
        let chain = chains.entry(record.task_id.clone()).or_default();

        let event = chain.head.link(record)?;
        chain.head.advance(&event);
        debug!(
            task_id = %record.task_id,
            sequence = event.sequence,
            kind = record.kind.label(),
            component = %record.component,
            "decision recorded"
        );
        chain.events.push(event);
        Ok(())
    }

    fn history(&self, task_id: &TaskId) -> TemperResult<Vec<DecisionRecord>> {
        let chains = self.lock()?;
        Ok(chains
            .get(task_id)
            .map(|c| c.events.iter().map(|e| e.record.clone()).collect())
            .unwrap_or_default())
    }
}
