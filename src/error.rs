use std::time::Duration;

use thiserror::Error;

use crate::config::Language;

/// Everything that can go wrong while building or running a submission.
///
/// Variants up to `Io` are scoped to a single pipeline call and end up as a
/// per-case `error` verdict. `UnsupportedLanguage` and everything after it
/// abort the whole judging run.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Failed to start `{command}`: {message}")]
    SpawnFailure { command: String, message: String },

    #[error("Compilation Error\n{0}")]
    CompileFailure(String),

    #[error("Time Limit Exceeded ({}ms)", .limit.as_millis())]
    TimeLimitExceeded { limit: Duration },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Process I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("No toolchain configured for {0}")]
    MissingToolchain(Language),

    #[error("Unable to create workspace: {0}")]
    Workspace(std::io::Error),

    #[error("Judge stopped unexpectedly")]
    Crashed,
}

impl JudgeError {
    /// Whether this error must abort the run instead of being attached to a case.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedLanguage(_)
                | Self::MissingToolchain(_)
                | Self::Workspace(_)
                | Self::Crashed
        )
    }
}

pub type Result<T> = std::result::Result<T, JudgeError>;
