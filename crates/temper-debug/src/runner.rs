//! Re-running the validating tests after a repair.

use std::io::Write;
use std::process::Command;

use tracing::debug;

use temper_contracts::{
    debug::TestOutcome,
    error::{TemperError, TemperResult},
};

pub trait TestRunner: Send + Sync {
    /// Run the tests against `code`. A failing test is an `Ok(Failed)`;
    /// `Err` means the tests could not be run at all.
    fn run(&self, code: &str) -> TemperResult<TestOutcome>;
}

/// Writes the code to a temporary file and runs `program args.. <file>`.
/// Exit status 0 means the tests passed.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    program: String,
    args: Vec<String>,
    suffix: String,
}

impl CommandTestRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            suffix: String::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// File name suffix for the temporary source file, e.g. `.py`.
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }
}

impl TestRunner for CommandTestRunner {
    fn run(&self, code: &str) -> TemperResult<TestOutcome> {
        let mut file = tempfile::Builder::new()
            .prefix("temper-debug-")
            .suffix(&self.suffix)
            .tempfile()
            .map_err(|e| TemperError::AgentFailed {
                agent_id: self.program.clone(),
                reason: format!("failed to create source file: {e}"),
            })?;
        file.write_all(code.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| TemperError::AgentFailed {
                agent_id: self.program.clone(),
                reason: format!("failed to write source file: {e}"),
            })?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .output()
            .map_err(|e| TemperError::AgentFailed {
                agent_id: self.program.clone(),
                reason: format!("failed to start test command: {e}"),
            })?;
        debug!(program = %self.program, status = %output.status, "test command finished");

        if output.status.success() {
            return Ok(TestOutcome::Passed);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let error_message = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(str::trim)
            .map(str::to_string)
            .unwrap_or_else(|| format!("test command exited with {}", output.status));
        Ok(TestOutcome::Failed {
            error_message,
            stack_trace: stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use temper_contracts::debug::TestOutcome;

    use super::{CommandTestRunner, TestRunner};

    #[test]
    fn test_zero_exit_passes() {
        let runner = CommandTestRunner::new("sh");
        assert_eq!(runner.run("exit 0\n").unwrap(), TestOutcome::Passed);
    }

    #[test]
    fn test_failure_reports_last_stderr_line() {
        let runner = CommandTestRunner::new("sh").suffix(".sh");
        let outcome = runner
            .run("echo 'Traceback' >&2\necho 'ValueError: bad input' >&2\nexit 1\n")
            .unwrap();
        match outcome {
            TestOutcome::Failed {
                error_message,
                stack_trace,
            } => {
                assert_eq!(error_message, "ValueError: bad input");
                assert!(stack_trace.starts_with("Traceback"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let runner = CommandTestRunner::new("/nonexistent/temper-runner");
        assert!(runner.run("").is_err());
    }
}
