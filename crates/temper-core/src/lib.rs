//! # temper-core
//!
//! The refinement runtime for TEMPER.
//!
//! This crate provides:
//! - The trait seams every component plugs into (`Producer`, `Gate`,
//!   `StrategySelector`, `Debugger`, `DecisionLog`, `StateStore`, `Agent`)
//! - `TemperConfig`, loaded from TOML with a default for every field
//! - The `RefinementLoop` that drives produce → verify rounds to a terminal
//!   state
//! - The `FinalizationGate` that keeps irreversible actions behind an
//!   explicit approval
//!
//! ## Usage
//!
//! ```rust,ignore
//! use temper_core::{RefinementLoop, RefinementTask, TemperConfig};
//! ```

pub mod config;
pub mod finalize;
pub mod persist;
pub mod refinement;
pub mod traits;

#[cfg(test)]
mod mocks;

pub use config::TemperConfig;
pub use finalize::{FinalizationGate, FinalizeOutcome};
pub use persist::{StoreKey, TaskLease};
pub use refinement::{RefinementLoop, RefinementTask};
