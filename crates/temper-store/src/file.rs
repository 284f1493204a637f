//! File-backed `StateStore`: one pretty-printed JSON file per key.
//!
//! Layout: `<root>/<task>/<namespace>.json`, with `/` in namespaces mapped
//! to `__`. Every write goes to a temp file next to the target and is then
//! renamed over it, so a reader never sees a half-written snapshot.
//! Read-modify-write is serialized by a store-wide mutex.
//!
//! Leases are lock files (`<root>/<task>.lock`) created with `create_new`,
//! which also excludes drivers in other processes. A driver that crashes
//! leaves its lock file behind; removing it by hand releases the task.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, warn};

use temper_contracts::{
    agent::TaskId,
    error::{TemperError, TemperResult},
};
use temper_core::{
    persist::{StoreKey, TaskLease},
    traits::StateStore,
};

fn store_error(reason: String) -> TemperError {
    TemperError::Store { reason }
}

fn sanitize(segment: &str) -> String {
    segment
        .replace('/', "__")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub struct FileStore {
    root: PathBuf,
    writes: Mutex<()>,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> TemperResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            store_error(format!("cannot create store root '{}': {e}", root.display()))
        })?;
        Ok(Self {
            root,
            writes: Mutex::new(()),
        })
    }

    pub fn path_for(&self, key: &StoreKey) -> PathBuf {
        self.root
            .join(sanitize(key.task_id.as_str()))
            .join(format!("{}.json", sanitize(&key.namespace)))
    }

    fn lock_path(&self, task_id: &TaskId) -> PathBuf {
        self.root.join(format!("{}.lock", sanitize(task_id.as_str())))
    }

    fn read(&self, key: &StoreKey) -> TemperResult<Option<Value>> {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_error(format!("cannot read '{}': {e}", path.display()))),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| store_error(format!("snapshot '{}' is not JSON: {e}", path.display())))
    }

    fn write(&self, key: &StoreKey, value: &Value) -> TemperResult<()> {
        let path = self.path_for(key);
        let contents = serde_json::to_string_pretty(value)
            .map_err(|e| store_error(format!("cannot serialize '{key}': {e}")))?;
        write_atomic(&path, &contents)?;
        debug!(key = %key, path = %path.display(), "snapshot written");
        Ok(())
    }

    fn guard(&self) -> TemperResult<std::sync::MutexGuard<'_, ()>> {
        self.writes
            .lock()
            .map_err(|e| store_error(format!("store write lock poisoned: {e}")))
    }
}

fn write_atomic(path: &Path, contents: &str) -> TemperResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| store_error(format!("cannot create '{}': {e}", parent.display())))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .map_err(|e| store_error(format!("cannot write '{}': {e}", tmp_path.display())))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| store_error(format!("cannot replace '{}': {e}", path.display())))
}

impl StateStore for FileStore {
    fn get(&self, key: &StoreKey) -> TemperResult<Option<Value>> {
        self.read(key)
    }

    fn put(&self, key: &StoreKey, value: Value) -> TemperResult<()> {
        let _guard = self.guard()?;
        self.write(key, &value)
    }

    fn update(
        &self,
        key: &StoreKey,
        apply: &mut dyn FnMut(Option<Value>) -> TemperResult<Value>,
    ) -> TemperResult<Value> {
        let _guard = self.guard()?;
        let next = apply(self.read(key)?)?;
        self.write(key, &next)?;
        Ok(next)
    }

    fn acquire(&self, task_id: &TaskId) -> TemperResult<TaskLease> {
        let path = self.lock_path(task_id);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                debug!(task_id = %task_id, "file lease acquired");
                Ok(TaskLease::new(task_id.clone(), move || {
                    if let Err(e) = fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %e, "failed to remove lease file");
                    }
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!(task_id = %task_id, "lease refused, lock file present");
                Err(TemperError::TaskLocked {
                    task_id: task_id.to_string(),
                })
            }
            Err(e) => Err(store_error(format!(
                "cannot create lock file '{}': {e}",
                path.display()
            ))),
        }
    }
}
