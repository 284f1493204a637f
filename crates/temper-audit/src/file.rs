//! JSONL file backend for `DecisionLog`.
//!
//! One file per task under the log directory, one `AuditEvent` per line.
//! Lines are only ever appended. On first use of a task the existing file is
//! read back and its chain verified, so a log that was edited on disk is
//! refused instead of being extended.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

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

fn write_failed(reason: String) -> TemperError {
    TemperError::AuditWriteFailed { reason }
}

/// File name for a task's log. Anything outside `[A-Za-z0-9._-]` becomes `_`.
fn file_name(task_id: &TaskId) -> String {
    let safe: String = task_id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.jsonl")
}

pub struct JsonlDecisionLog {
    dir: PathBuf,
    heads: Mutex<BTreeMap<TaskId, ChainHead>>,
}

impl JsonlDecisionLog {
    /// Open (creating if needed) a log rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> TemperResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            write_failed(format!("cannot create log directory '{}': {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            heads: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn path_for(&self, task_id: &TaskId) -> PathBuf {
        self.dir.join(file_name(task_id))
    }

    /// Read every event recorded for `task_id`.
    pub fn read_events(&self, task_id: &TaskId) -> TemperResult<Vec<AuditEvent>> {
        read_events(&self.path_for(task_id))
    }

    pub fn export_trail(&self, task_id: &TaskId) -> TemperResult<AuditTrail> {
        Ok(AuditTrail::new(task_id.clone(), self.read_events(task_id)?))
    }

    /// Re-read the file of `task_id` and verify its chain.
    pub fn verify_integrity(&self, task_id: &TaskId) -> TemperResult<bool> {
        Ok(verify_chain(&self.read_events(task_id)?))
    }
}

fn read_events(path: &Path) -> TemperResult<Vec<AuditEvent>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(write_failed(format!("cannot open '{}': {e}", path.display()))),
    };
    let mut events = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line =
            line.map_err(|e| write_failed(format!("cannot read '{}': {e}", path.display())))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: AuditEvent = serde_json::from_str(&line).map_err(|e| {
            write_failed(format!(
                "line {} of '{}' is not an audit event: {e}",
                number + 1,
                path.display()
            ))
        })?;
        events.push(event);
    }
    Ok(events)
}

impl DecisionLog for JsonlDecisionLog {
    fn append(&self, record: &DecisionRecord) -> TemperResult<()> {
        let mut heads = self
            .heads
            .lock()
            .map_err(|e| write_failed(format!("decision log lock poisoned: {e}")))?;
        let path = self.path_for(&record.task_id);

        if !heads.contains_key(&record.task_id) {
            let existing = read_events(&path)?;
            if !verify_chain(&existing) {
                warn!(task_id = %record.task_id, path = %path.display(), "audit chain broken on disk");
                return Err(write_failed(format!(
                    "refusing to extend '{}': hash chain does not verify",
                    path.display()
                )));
            }
            heads.insert(record.task_id.clone(), ChainHead::after(&existing));
        }
        let head = heads
            .get_mut(&record.task_id)
            .ok_or_else(|| write_failed("chain head vanished".to_string()))?;

        let event = head.link(record)?;
        let mut line = serde_json::to_string(&event)
            .map_err(|e| write_failed(format!("cannot serialize audit event: {e}")))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| write_failed(format!("cannot open '{}': {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| write_failed(format!("cannot append to '{}': {e}", path.display())))?;

        head.advance(&event);
        debug!(
            task_id = %record.task_id,
            sequence = event.sequence,
            kind = record.kind.label(),
            "decision appended to file"
        );
        Ok(())
    }

    fn history(&self, task_id: &TaskId) -> TemperResult<Vec<DecisionRecord>> {
        Ok(self
            .read_events(task_id)?
            .into_iter()
            .map(|e| e.record)
            .collect())
    }
}
