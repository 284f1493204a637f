//! # temper-verify
//!
//! The verification gate for TEMPER.
//!
//! `VerificationGate` implements `temper_core::traits::Gate`. Each artifact
//! is scored on four dimensions (completeness, compliance, coverage,
//! alignment) by pluggable `DimensionCheck`s. Dimension scores are combined
//! with configurable weights, renormalized over the dimensions that apply,
//! and compared against the phase threshold. Every decision is appended to
//! the decision log before it is returned.
//!
//! JSON artifacts are additionally validated against a `JsonRuleSet`: a
//! JSON Schema document plus field-level rules.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use temper_verify::VerificationGate;
//!
//! let gate = VerificationGate::new(config.weights, config.thresholds, log);
//! let decision = gate.verify(&request)?;
//! ```

pub mod artifact;
pub mod checks;
pub mod dimension;
pub mod gate;
pub mod schema;

pub use dimension::{CheckContext, CheckResult, DimensionCheck, DimensionOutcome};
pub use gate::VerificationGate;
