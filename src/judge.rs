//! Sequential judging of one program against an ordered list of test cases.

use serde::{Deserialize, Serialize};

use crate::error::{JudgeError, Result};
use crate::sandbox::{ExecutionResult, Pipeline, lookup, with_workspace};

/// Per-case verdict state
///
/// `Idle -> Waiting -> Running -> {Correct | Wrong | Error}`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    #[default]
    Idle,
    Waiting,
    Running,
    Correct,
    Wrong,
    Error,
}

impl CaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Correct | Self::Wrong | Self::Error)
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Waiting | Self::Running)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: u64,
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub actual_output: String,
    #[serde(default)]
    pub status: CaseStatus,
}

impl TestCase {
    pub fn new(id: u64, input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            id,
            input: input.into(),
            expected_output: expected_output.into(),
            actual_output: String::new(),
            status: CaseStatus::Idle,
        }
    }

    /// The case every fresh session starts with
    pub fn seed() -> Self {
        Self::new(1, "10 20", "30")
    }

    fn fail(&mut self, error: &JudgeError) {
        self.status = CaseStatus::Error;
        self.actual_output = format!("Error: {error}");
    }
}

/// Overall state of a run, derived from its cases
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Ready,
    Running,
    Finished,
}

pub fn run_status(cases: &[TestCase]) -> RunStatus {
    if cases.iter().any(|case| case.status.is_pending()) {
        RunStatus::Running
    } else if !cases.is_empty() && cases.iter().all(|case| case.status == CaseStatus::Idle) {
        RunStatus::Ready
    } else {
        RunStatus::Finished
    }
}

pub struct Judge {
    pipeline: Pipeline,
}

impl Judge {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Judges `source_code` against every case, in order
    ///
    /// `on_update` receives the full list after every status change. The
    /// program is built once; a failed build marks every case as `Error`.
    /// Unknown languages and missing toolchains fail before anything is
    /// touched. When the workspace cannot be created the cases are marked
    /// as failed, published, and the error is returned.
    pub fn run_all<F>(
        &self,
        language: &str,
        source_code: &str,
        mut cases: Vec<TestCase>,
        mut on_update: F,
    ) -> Result<Vec<TestCase>>
    where
        F: FnMut(&[TestCase]),
    {
        let spec = lookup(language)?;
        self.pipeline.check(spec)?;

        for case in cases.iter_mut() {
            case.status = CaseStatus::Waiting;
            case.actual_output.clear();
        }
        on_update(&cases);
        log::info!("Judging {} case(s) in {}", cases.len(), spec.language);

        let finished = with_workspace(self.pipeline.workspace_root(), |workspace| {
            let target = match self.pipeline.build(spec, source_code, workspace) {
                Ok(target) => target,
                Err(e) => {
                    log::info!("Build failed: {e}");
                    fail_pending(&mut cases, &e);
                    on_update(&cases);
                    return;
                }
            };

            for idx in 0..cases.len() {
                if self.pipeline.is_cancelled() {
                    fail_pending(&mut cases, &JudgeError::Cancelled);
                    on_update(&cases);
                    return;
                }

                cases[idx].status = CaseStatus::Running;
                on_update(&cases);

                let outcome = self.pipeline.execute(&target, &cases[idx].input);
                log::debug!("Case {} finished: {outcome:?}", cases[idx].id);
                apply_verdict(&mut cases[idx], outcome);
                on_update(&cases);
            }
        });

        if let Err(e) = finished {
            log::error!("Judging run aborted: {e}");
            fail_pending(&mut cases, &e);
            on_update(&cases);
            return Err(e);
        }

        log::info!(
            "Judging finished: {}/{} correct",
            cases
                .iter()
                .filter(|case| case.status == CaseStatus::Correct)
                .count(),
            cases.len()
        );
        Ok(cases)
    }
}

/// Marks every case that has not reached a verdict as failed with `error`
pub fn fail_pending(cases: &mut [TestCase], error: &JudgeError) {
    cases
        .iter_mut()
        .filter(|case| !case.status.is_terminal())
        .for_each(|case| case.fail(error));
}

/// Turns one execution outcome into the case's verdict and display text
///
/// A program that exits non-zero gets `Error` regardless of what it printed.
fn apply_verdict(case: &mut TestCase, outcome: Result<ExecutionResult>) {
    let result = match outcome {
        Ok(result) => result,
        Err(e) => return case.fail(&e),
    };

    let mut display = result.stdout.clone();
    if !result.stderr.is_empty() {
        display.push_str("\n[Stderr]\n");
        display.push_str(&result.stderr);
    }

    if result.success() {
        case.status = if compare_output_trimmed(&result.stdout, &case.expected_output) {
            CaseStatus::Correct
        } else {
            CaseStatus::Wrong
        };
        case.actual_output = display;
    } else {
        case.status = CaseStatus::Error;
        let reason = match result.exit_code {
            Some(code) => format!("Runtime Error (exit code {code})"),
            None => "Runtime Error (terminated by signal)".to_string(),
        };
        case.actual_output = if display.is_empty() {
            format!("Error: {reason}")
        } else {
            format!("Error: {reason}\n{display}")
        };
    }
}

/// Equal once leading and trailing whitespace is stripped from both sides
fn compare_output_trimmed(program_output: &str, expected_output: &str) -> bool {
    program_output.trim() == expected_output.trim()
}
