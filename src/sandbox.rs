mod pipeline;
mod runner;
mod workspace;

pub use pipeline::{LANGUAGES, LanguageSpec, Pipeline, Program, RunnableTarget, Stage, lookup};
pub use runner::{MAX_OUTPUT_BYTES, run};
pub use workspace::{Workspace, with_workspace};

use serde::Serialize;

use crate::config::Language;
use crate::error::{JudgeError, Result};

/// A single program invocation: build the source, then feed it `stdin`
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language: Language,
    pub source_code: String,
    pub stdin: String,
}

/// Output of a process that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Set when either stream exceeded `MAX_OUTPUT_BYTES`
    pub truncated: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Flattened outcome of one invocation, as handed back to the host application
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<ExecutionResult>> for RunReport {
    fn from(outcome: Result<ExecutionResult>) -> Self {
        match outcome {
            Ok(result) => Self {
                success: true,
                stdout: result.stdout,
                stderr: result.stderr,
                code: result.exit_code,
                timed_out: false,
                error: None,
            },
            Err(e) => Self {
                success: false,
                stdout: String::new(),
                stderr: String::new(),
                code: None,
                timed_out: matches!(e, JudgeError::TimeLimitExceeded { .. }),
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_report_keeps_nonzero_exit_as_data() {
        let report = RunReport::from(Ok(ExecutionResult {
            stdout: "partial".to_string(),
            stderr: "boom".to_string(),
            exit_code: Some(1),
            truncated: false,
        }));
        assert!(report.success);
        assert_eq!(report.code, Some(1));
        assert_eq!(report.error, None);
    }

    #[test]
    fn test_report_flags_timeout() {
        let report = RunReport::from(Err(JudgeError::TimeLimitExceeded {
            limit: Duration::from_millis(5000),
        }));
        assert!(!report.success);
        assert!(report.timed_out);
        assert_eq!(report.error.as_deref(), Some("Time Limit Exceeded (5000ms)"));
    }
}
