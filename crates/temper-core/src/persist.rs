//! Store keys, task leases, and typed snapshot helpers.
//!
//! `StateStore` only knows about JSON values. The helpers here give the
//! refinement loop, the debug loop, and the retriever typed access to their
//! snapshots and enforce the one rule every writer shares: a refinement
//! snapshot never moves backwards.

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use temper_contracts::{
    agent::{Phase, TaskId},
    context::ContextSummary,
    debug::DebugSession,
    error::{TemperError, TemperResult},
    refinement::RefinementState,
};

use crate::traits::StateStore;

/// Identifies one snapshot: a task plus a namespace within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreKey {
    pub task_id: TaskId,
    pub namespace: String,
}

impl StoreKey {
    pub fn new(task_id: TaskId, namespace: impl Into<String>) -> Self {
        Self {
            task_id,
            namespace: namespace.into(),
        }
    }

    /// The refinement state of `task_id` in `phase`.
    pub fn refinement(task_id: &TaskId, phase: Phase) -> Self {
        Self::new(task_id.clone(), format!("refinement/{phase}"))
    }

    pub fn debug_session(task_id: &TaskId) -> Self {
        Self::new(task_id.clone(), "debug-session")
    }

    pub fn context_summary(task_id: &TaskId) -> Self {
        Self::new(task_id.clone(), "context-summary")
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.task_id, self.namespace)
    }
}

/// Exclusive right to drive one task. Released when dropped.
pub struct TaskLease {
    task_id: TaskId,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl TaskLease {
    /// `release` runs exactly once, when the lease is dropped.
    pub fn new(task_id: TaskId, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            task_id,
            release: Some(Box::new(release)),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

impl fmt::Debug for TaskLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLease")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

impl Drop for TaskLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

fn decode<T: DeserializeOwned>(key: &StoreKey, value: Value) -> TemperResult<T> {
    serde_json::from_value(value).map_err(|e| TemperError::Store {
        reason: format!("snapshot '{key}' is corrupt: {e}"),
    })
}

fn encode<T: Serialize>(key: &StoreKey, value: &T) -> TemperResult<Value> {
    serde_json::to_value(value).map_err(|e| TemperError::Store {
        reason: format!("failed to serialize snapshot '{key}': {e}"),
    })
}

fn load<T: DeserializeOwned>(store: &dyn StateStore, key: &StoreKey) -> TemperResult<Option<T>> {
    store.get(key)?.map(|value| decode(key, value)).transpose()
}

pub fn load_refinement(
    store: &dyn StateStore,
    task_id: &TaskId,
    phase: Phase,
) -> TemperResult<Option<RefinementState>> {
    load(store, &StoreKey::refinement(task_id, phase))
}

/// Persist `state`, refusing to overwrite a snapshot from a later round.
pub fn save_refinement(store: &dyn StateStore, state: &RefinementState) -> TemperResult<()> {
    let key = StoreKey::refinement(state.task_id(), state.phase());
    let next = encode(&key, state)?;
    store.update(&key, &mut |current: Option<Value>| -> TemperResult<Value> {
        if let Some(current) = current {
            let stored: RefinementState = decode(&key, current)?;
            if stored.current_round() > state.current_round() {
                return Err(TemperError::StateMachine {
                    reason: format!(
                        "refusing to rewind '{key}' from round {} to {}",
                        stored.current_round(),
                        state.current_round()
                    ),
                });
            }
        }
        Ok(next.clone())
    })?;
    Ok(())
}

pub fn load_debug_session(
    store: &dyn StateStore,
    task_id: &TaskId,
) -> TemperResult<Option<DebugSession>> {
    load(store, &StoreKey::debug_session(task_id))
}

pub fn save_debug_session(store: &dyn StateStore, session: &DebugSession) -> TemperResult<()> {
    let key = StoreKey::debug_session(session.task_id());
    store.put(&key, encode(&key, session)?)
}

pub fn load_context_summary(
    store: &dyn StateStore,
    task_id: &TaskId,
) -> TemperResult<Option<ContextSummary>> {
    load(store, &StoreKey::context_summary(task_id))
}

pub fn save_context_summary(
    store: &dyn StateStore,
    task_id: &TaskId,
    summary: &ContextSummary,
) -> TemperResult<()> {
    let key = StoreKey::context_summary(task_id);
    store.put(&key, encode(&key, summary)?)
}
