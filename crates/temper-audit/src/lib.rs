//! # temper-audit
//!
//! Append-only, SHA-256 hash-chained decision log for TEMPER.
//!
//! ## Overview
//!
//! Every `DecisionRecord` is wrapped in an `AuditEvent` linked to the
//! previous event of the same task through its SHA-256 hash. Each task has
//! its own chain. Tampering with any event breaks the chain and is detected
//! by `verify_chain`.
//!
//! Two backends implement `temper_core::traits::DecisionLog`:
//! `InMemoryDecisionLog` and `JsonlDecisionLog` (one JSONL file per task).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use temper_audit::InMemoryDecisionLog;
//! use temper_core::traits::DecisionLog;
//!
//! let log = InMemoryDecisionLog::new();
//! log.append(&record)?;
//! assert!(log.verify_integrity(&record.task_id)?);
//! ```

pub mod chain;
pub mod event;
pub mod file;
pub mod memory;

pub use chain::{hash_event, verify_chain};
pub use event::{AuditEvent, AuditTrail};
pub use file::JsonlDecisionLog;
pub use memory::InMemoryDecisionLog;
