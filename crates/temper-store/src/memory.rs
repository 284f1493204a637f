//! In-memory `StateStore`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use temper_contracts::{
    agent::TaskId,
    error::{TemperError, TemperResult},
};
use temper_core::{
    persist::{StoreKey, TaskLease},
    traits::StateStore,
};

use crate::lease::TaskLeases;

/// Snapshots in a map behind one mutex. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    values: Arc<Mutex<BTreeMap<StoreKey, Value>>>,
    leases: TaskLeases,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leases(&self) -> &TaskLeases {
        &self.leases
    }

    /// Every key stored for `task_id`.
    pub fn keys_for(&self, task_id: &TaskId) -> TemperResult<Vec<StoreKey>> {
        Ok(self
            .lock()?
            .keys()
            .filter(|k| &k.task_id == task_id)
            .cloned()
            .collect())
    }

    fn lock(&self) -> TemperResult<MutexGuard<'_, BTreeMap<StoreKey, Value>>> {
        self.values.lock().map_err(|e| TemperError::Store {
            reason: format!("store lock poisoned: {e}"),
        })
    }
}

impl StateStore for InMemoryStore {
    fn get(&self, key: &StoreKey) -> TemperResult<Option<Value>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &StoreKey, value: Value) -> TemperResult<()> {
        self.lock()?.insert(key.clone(), value);
        Ok(())
    }

    fn update(
        &self,
        key: &StoreKey,
        apply: &mut dyn FnMut(Option<Value>) -> TemperResult<Value>,
    ) -> TemperResult<Value> {
        let mut values = self.lock()?;
        let next = apply(values.get(key).cloned())?;
        values.insert(key.clone(), next.clone());
        Ok(next)
    }

    fn acquire(&self, task_id: &TaskId) -> TemperResult<TaskLease> {
        self.leases.acquire(task_id)
    }
}
