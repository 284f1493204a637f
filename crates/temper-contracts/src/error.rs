//! Runtime error types for the TEMPER refinement core.
//!
//! Quality shortfalls are never errors: a gate that says "insufficient" is a
//! normal outcome the refinement loop recovers from. The variants here cover
//! contract violations, configuration problems, and infrastructure failures.

use thiserror::Error;

/// The unified error type for the TEMPER crates.
#[derive(Debug, Error)]
pub enum TemperError {
    /// A request or response violated the agent communication contract.
    ///
    /// Rejected immediately and never retried.
    #[error("input contract violation: {reason}")]
    InputContract { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A loop or session was driven through an illegal transition.
    #[error("state machine error: {reason}")]
    StateMachine { reason: String },

    /// The decision log could not persist a record.
    ///
    /// Fatal for the step in progress: a decision that cannot be audited
    /// cannot take effect.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// The persistence layer failed to read or write a snapshot.
    #[error("store error: {reason}")]
    Store { reason: String },

    /// Another driver currently holds the lease for this task.
    #[error("task '{task_id}' is locked by another driver")]
    TaskLocked { task_id: String },

    /// An agent invocation failed outright (as opposed to producing a
    /// low-quality artifact).
    #[error("agent '{agent_id}' failed: {reason}")]
    AgentFailed { agent_id: String, reason: String },

    /// A JSON Schema document could not be compiled.
    #[error("schema validation error: {reason}")]
    SchemaValidation { reason: String },

    /// An irreversible action was attempted without explicit approval.
    #[error("approval required: {reason}")]
    ApprovalRequired { reason: String },
}

/// Convenience alias used throughout the TEMPER crates.
pub type TemperResult<T> = Result<T, TemperError>;
