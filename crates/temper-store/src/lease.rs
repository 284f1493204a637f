//! In-process exclusive leases, one per task id.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use temper_contracts::{
    agent::TaskId,
    error::{TemperError, TemperResult},
};
use temper_core::persist::TaskLease;

/// The set of task ids currently driven by someone in this process.
#[derive(Clone, Default)]
pub struct TaskLeases {
    held: Arc<Mutex<BTreeSet<TaskId>>>,
}

impl TaskLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `task_id`, or fail with `TaskLocked`.
    pub fn acquire(&self, task_id: &TaskId) -> TemperResult<TaskLease> {
        let mut held = self.held.lock().map_err(|e| TemperError::Store {
            reason: format!("lease table lock poisoned: {e}"),
        })?;
        if !held.insert(task_id.clone()) {
            warn!(task_id = %task_id, "lease refused, task already driven");
            return Err(TemperError::TaskLocked {
                task_id: task_id.to_string(),
            });
        }
        debug!(task_id = %task_id, "lease acquired");

        let table = self.held.clone();
        let released = task_id.clone();
        Ok(TaskLease::new(task_id.clone(), move || {
            if let Ok(mut held) = table.lock() {
                held.remove(&released);
            }
        }))
    }

    pub fn is_held(&self, task_id: &TaskId) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(task_id))
            .unwrap_or(false)
    }
}
