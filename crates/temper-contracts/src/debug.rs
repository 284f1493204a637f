//! Auto-debug session types.
//!
//! A `DebugSession` groups the ordered `DebugAttempt`s made against one
//! failing artifact. Its fields are private and only the three lifecycle
//! methods mutate it, which keeps the session invariants structural:
//! `total_iterations == attempts.len()`, success implies a final artifact,
//! and a session is never both resolved and escalated.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    agent::TaskId,
    error::{TemperError, TemperResult},
};

/// The fixed error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPattern {
    Syntax,
    Type,
    Name,
    AttributeNull,
    Import,
    Value,
    Assertion,
    Logic,
}

impl ErrorPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPattern::Syntax => "syntax",
            ErrorPattern::Type => "type",
            ErrorPattern::Name => "name",
            ErrorPattern::AttributeNull => "attribute-null",
            ErrorPattern::Import => "import",
            ErrorPattern::Value => "value",
            ErrorPattern::Assertion => "assertion",
            ErrorPattern::Logic => "logic",
        }
    }
}

impl fmt::Display for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime or test failure reported against an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// The artifact (code) that failed.
    pub artifact: String,
    pub error_message: String,
    pub stack_trace: String,
}

/// Result of re-running the validating test after a repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum TestOutcome {
    Passed,
    Failed {
        error_message: String,
        stack_trace: String,
    },
    /// The repair was not applied, so the test was not re-run.
    NotRun { reason: String },
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }
}

/// One classify → repair → re-test cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugAttempt {
    /// 1-based position within the session.
    pub attempt: u32,
    pub error_pattern: ErrorPattern,
    pub error_message: String,
    pub stack_trace: String,
    pub repair_description: String,
    /// The code after the repair was applied (unchanged if none was).
    pub repaired_code: String,
    pub test_outcome: TestOutcome,
    pub rationale: String,
    pub attempted_at: DateTime<Utc>,
}

/// All attempts made for one task's failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugSession {
    task_id: TaskId,
    max_attempts: u32,
    attempts: Vec<DebugAttempt>,
    total_iterations: u32,
    success: bool,
    escalated: bool,
    final_artifact: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl DebugSession {
    /// Open a session allowing at most `max_attempts` attempts (1 to 5).
    pub fn open(task_id: TaskId, max_attempts: u32) -> TemperResult<Self> {
        if !(1..=5).contains(&max_attempts) {
            return Err(TemperError::Config {
                reason: format!("debug attempt cap {max_attempts} outside 1..=5"),
            });
        }
        Ok(Self {
            task_id,
            max_attempts,
            attempts: Vec::new(),
            total_iterations: 0,
            success: false,
            escalated: false,
            final_artifact: None,
            started_at: Utc::now(),
            finished_at: None,
        })
    }

    pub fn push_attempt(&mut self, attempt: DebugAttempt) -> TemperResult<()> {
        self.ensure_open()?;
        if self.attempts.len() as u32 >= self.max_attempts {
            return Err(TemperError::StateMachine {
                reason: format!(
                    "debug session for '{}' already holds {} attempts",
                    self.task_id, self.max_attempts
                ),
            });
        }
        self.attempts.push(attempt);
        self.total_iterations = self.attempts.len() as u32;
        Ok(())
    }

    /// Mark the session resolved with the repaired artifact.
    pub fn resolve(&mut self, final_artifact: String) -> TemperResult<()> {
        self.ensure_open()?;
        if self.attempts.is_empty() {
            return Err(TemperError::StateMachine {
                reason: "cannot resolve a debug session with no attempts".to_string(),
            });
        }
        self.success = true;
        self.final_artifact = Some(final_artifact);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Give up and hand the full history to a human.
    pub fn escalate(&mut self) -> TemperResult<()> {
        self.ensure_open()?;
        self.escalated = true;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_open(&self) -> TemperResult<()> {
        if self.is_finished() {
            return Err(TemperError::StateMachine {
                reason: format!("debug session for '{}' is already closed", self.task_id),
            });
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.success || self.escalated
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempts(&self) -> &[DebugAttempt] {
        &self.attempts
    }

    pub fn total_iterations(&self) -> u32 {
        self.total_iterations
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn escalated(&self) -> bool {
        self.escalated
    }

    pub fn final_artifact(&self) -> Option<&str> {
        self.final_artifact.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Check all session invariants; used on deserialized sessions.
    pub fn check_invariants(&self) -> bool {
        self.total_iterations as usize == self.attempts.len()
            && !(self.success && self.escalated)
            && (!self.success || self.final_artifact.is_some())
            && self.attempts.len() as u32 <= self.max_attempts
    }
}
