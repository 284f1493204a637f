//! # temper-debug
//!
//! The auto-debug loop for TEMPER.
//!
//! `AutoDebugLoop` implements `temper_core::traits::Debugger`. A failure is
//! classified into the fixed `ErrorPattern` taxonomy, rule-based
//! `RepairStrategy`s propose a repaired version of the code, the
//! `ExpectationGuard` refuses any proposal that touches an assertion, and a
//! `TestRunner` re-runs the tests. Sessions are capped at five attempts,
//! persisted by task id, and every attempt is appended to the decision log.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use temper_debug::{AutoDebugLoop, CommandTestRunner};
//!
//! let runner = CommandTestRunner::new("python3").suffix(".py");
//! let debugger = AutoDebugLoop::new(Arc::new(runner), store, log);
//! let session = debugger.debug(&task_id, &failure)?;
//! ```

pub mod classify;
pub mod engine;
pub mod guard;
pub mod repair;
pub mod runner;

pub use classify::{Classification, Classifier};
pub use engine::{AutoDebugLoop, DebugRequest};
pub use guard::ExpectationGuard;
pub use repair::{builtin_strategies, Repair, RepairContext, RepairStrategy};
pub use runner::{CommandTestRunner, TestRunner};
