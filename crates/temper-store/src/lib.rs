//! # temper-store
//!
//! Persistence for TEMPER: JSON snapshots keyed by `StoreKey`, atomic
//! read-modify-write per key, and exclusive per-task leases.
//!
//! - `InMemoryStore` keeps everything in a mutex-guarded map
//! - `FileStore` writes one JSON file per key (temp file + rename) and uses
//!   lock files for leases
//!
//! Both implement `temper_core::traits::StateStore`; the typed helpers in
//! `temper_core::persist` sit on top.

pub mod file;
pub mod lease;
pub mod memory;

pub use file::FileStore;
pub use lease::TaskLeases;
pub use memory::InMemoryStore;

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use temper_contracts::{
        agent::{Phase, TaskId},
        error::TemperError,
        refinement::{LoopSettings, RefinementState},
    };
    use temper_core::{
        persist::{self, StoreKey},
        traits::StateStore,
    };

    use super::{FileStore, InMemoryStore};

    fn exercise_contract(store: &dyn StateStore) {
        let key = StoreKey::new(TaskId::new("task-contract"), "notes");
        assert_eq!(store.get(&key).unwrap(), None);

        store.put(&key, json!({ "n": 1 })).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(json!({ "n": 1 })));

        let next = store
            .update(&key, &mut |current: Option<Value>| {
                let n = current.and_then(|v| v["n"].as_i64()).unwrap_or(0);
                Ok(json!({ "n": n + 1 }))
            })
            .unwrap();
        assert_eq!(next, json!({ "n": 2 }));

        let failed = store.update(&key, &mut |_| {
            Err(TemperError::StateMachine {
                reason: "rejected".to_string(),
            })
        });
        assert!(failed.is_err());
        assert_eq!(store.get(&key).unwrap(), Some(json!({ "n": 2 })), "failed update must not write");
    }

    fn exercise_leases(store: &dyn StateStore) {
        let task = TaskId::new("task-lease");
        let lease = store.acquire(&task).unwrap();
        assert!(matches!(store.acquire(&task), Err(TemperError::TaskLocked { .. })));
        assert!(store.acquire(&TaskId::new("task-other")).is_ok());
        drop(lease);
        assert!(store.acquire(&task).is_ok(), "lease must be free after drop");
    }

    fn exercise_concurrent_updates(store: &dyn StateStore) {
        let key = StoreKey::new(TaskId::new("task-counter"), "counter");
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        store
                            .update(&key, &mut |current: Option<Value>| {
                                let n = current.and_then(|v| v.as_i64()).unwrap_or(0);
                                Ok(json!(n + 1))
                            })
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(store.get(&key).unwrap(), Some(json!(200)));
    }

    #[test]
    fn test_memory_store_contract() {
        let store = InMemoryStore::new();
        exercise_contract(&store);
        exercise_leases(&store);
        exercise_concurrent_updates(&store);
        assert_eq!(store.keys_for(&TaskId::new("task-contract")).unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        exercise_contract(&store);
        exercise_leases(&store);
        exercise_concurrent_updates(&store);
    }

    #[test]
    fn test_memory_clones_share_leases() {
        let store = InMemoryStore::new();
        let other = store.clone();
        let task = TaskId::new("task-shared");

        let _lease = store.acquire(&task).unwrap();
        assert!(other.leases().is_held(&task));
        assert!(matches!(other.acquire(&task), Err(TemperError::TaskLocked { .. })));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let task = TaskId::new("task-reopen");
        let state =
            RefinementState::new(task.clone(), Phase::Specification, LoopSettings::default())
                .unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            persist::save_refinement(&store, &state).unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        let loaded = persist::load_refinement(&store, &task, Phase::Specification)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, state);

        let path = store.path_for(&StoreKey::refinement(&task, Phase::Specification));
        assert!(path.ends_with("task-reopen/refinement__specification.json"));
        assert!(!path.with_extension("json.tmp").exists(), "temp file must be renamed away");
    }

    #[test]
    fn test_file_store_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let key = StoreKey::new(TaskId::new("task-corrupt"), "notes");
        store.put(&key, json!(1)).unwrap();
        std::fs::write(store.path_for(&key), "{ not json").unwrap();

        assert!(matches!(store.get(&key), Err(TemperError::Store { .. })));
    }
}
