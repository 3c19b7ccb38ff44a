use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::runner;
use super::workspace::{Workspace, with_workspace};
use super::{ExecutionRequest, ExecutionResult};
use crate::config::{JudgeConfig, Language, ToolchainConfig};
use crate::error::{JudgeError, Result};

const EXECUTABLE_NAME: &str = if cfg!(windows) { "main.exe" } else { "main.out" };

/// What a stage launches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// The path configured for the language
    Toolchain,
    /// The file produced by the compile stage
    Artifact,
    /// A fixed launcher looked up on `PATH`
    Launcher(&'static str),
}

/// One process invocation; `args` may contain `%INPUT%` (source path),
/// `%OUTPUT%` (artifact path) and `%DIR%` (workspace directory)
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub program: Program,
    pub args: &'static [&'static str],
}

/// How to build and run one language
#[derive(Debug)]
pub struct LanguageSpec {
    pub language: Language,
    pub source_name: &'static str,
    pub compile: Option<Stage>,
    pub run: Stage,
}

pub static LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        language: Language::Cpp,
        source_name: "main.cpp",
        compile: Some(Stage {
            program: Program::Toolchain,
            args: &["%INPUT%", "-o", "%OUTPUT%"],
        }),
        run: Stage {
            program: Program::Artifact,
            args: &[],
        },
    },
    LanguageSpec {
        language: Language::Python,
        source_name: "main.py",
        compile: None,
        run: Stage {
            program: Program::Toolchain,
            args: &["%INPUT%"],
        },
    },
    // javac insists on the file being named after the public class
    LanguageSpec {
        language: Language::Java,
        source_name: "Main.java",
        compile: Some(Stage {
            program: Program::Toolchain,
            args: &["%INPUT%"],
        }),
        run: Stage {
            program: Program::Launcher("java"),
            args: &["-cp", "%DIR%", "Main"],
        },
    },
];

impl LanguageSpec {
    pub fn of(language: Language) -> Result<&'static LanguageSpec> {
        LANGUAGES
            .iter()
            .find(|spec| spec.language == language)
            .ok_or_else(|| JudgeError::UnsupportedLanguage(language.to_string()))
    }
}

/// Resolves a language identifier without touching the filesystem
pub fn lookup(language: &str) -> Result<&'static LanguageSpec> {
    LanguageSpec::of(language.parse()?)
}

/// A built program, ready to be run once per test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnableTarget {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
}

/// Compile and run stages for one judging run, sharing a toolchain snapshot
/// and a cancellation token
#[derive(Debug, Clone)]
pub struct Pipeline {
    toolchains: ToolchainConfig,
    limits: JudgeConfig,
    workspace_root: PathBuf,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(toolchains: ToolchainConfig, limits: JudgeConfig) -> Self {
        Self {
            toolchains,
            limits,
            workspace_root: std::env::temp_dir(),
            cancel: CancellationToken::new(),
        }
    }

    /// Creates workspaces under `root` instead of the system temp dir
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails when the language has no usable toolchain path
    pub fn check(&self, spec: &LanguageSpec) -> Result<()> {
        self.toolchains.path_for(spec.language).map(|_| ())
    }

    /// Writes the source into `workspace` and runs the compile stage, if any
    pub fn build(
        &self,
        spec: &LanguageSpec,
        source_code: &str,
        workspace: &Workspace,
    ) -> Result<RunnableTarget> {
        let toolchain = self.toolchains.path_for(spec.language)?;
        let source_path = workspace.write_source(spec.source_name, source_code)?;
        let artifact_path = workspace.join(EXECUTABLE_NAME);

        let source = source_path.to_string_lossy();
        let artifact = artifact_path.to_string_lossy();
        let dir = workspace.path().to_string_lossy();
        let mapping = [
            ("%INPUT%", source.as_ref()),
            ("%OUTPUT%", artifact.as_ref()),
            ("%DIR%", dir.as_ref()),
        ];

        if let Some(stage) = &spec.compile {
            let (program, args) = resolve_stage(stage, toolchain, &mapping);
            log::debug!("Compiling {} source: `{program}` {args:?}", spec.language);

            let result = self.run_stage(
                &program,
                &args,
                None,
                self.limits.compile_time_limit.into(),
                workspace.path(),
            )?;
            if !result.success() {
                return Err(JudgeError::CompileFailure(compiler_message(&result)));
            }
        }

        let (program, args) = resolve_stage(&spec.run, toolchain, &mapping);
        Ok(RunnableTarget {
            program,
            args,
            workdir: workspace.path().to_path_buf(),
        })
    }

    /// Runs a built target once with its own stdin
    pub fn execute(&self, target: &RunnableTarget, stdin: &str) -> Result<ExecutionResult> {
        self.run_stage(
            &target.program,
            &target.args,
            Some(stdin),
            self.limits.time_limit.into(),
            &target.workdir,
        )
    }

    /// Builds and runs a single request inside a throwaway workspace
    pub fn build_and_run(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let spec = LanguageSpec::of(request.language)?;
        self.check(spec)?;

        with_workspace(&self.workspace_root, |workspace| {
            let target = self.build(spec, &request.source_code, workspace)?;
            self.execute(&target, &request.stdin)
        })?
    }

    fn run_stage(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
        limit: Duration,
        workdir: &Path,
    ) -> Result<ExecutionResult> {
        tokio::runtime::Handle::current().block_on(runner::run(
            program,
            args,
            stdin,
            limit,
            Some(workdir),
            &self.cancel,
        ))
    }
}

/// Picks the program for a stage and applies placeholder substitutions to its arguments
fn resolve_stage(stage: &Stage, toolchain: &str, mapping: &[(&str, &str)]) -> (String, Vec<String>) {
    let program = match stage.program {
        Program::Toolchain => toolchain.to_string(),
        Program::Artifact => apply_template("%OUTPUT%", mapping),
        Program::Launcher(name) => name.to_string(),
    };
    let args = stage
        .args
        .iter()
        .map(|arg| apply_template(arg, mapping))
        .collect();

    (program, args)
}

fn apply_template(template: &str, mapping: &[(&str, &str)]) -> String {
    mapping
        .iter()
        .fold(template.to_string(), |acc, (key, value)| acc.replace(key, value))
}

/// Text shown to the user for a failed compile: stderr, else stdout, else the exit code
fn compiler_message(result: &ExecutionResult) -> String {
    [&result.stderr, &result.stdout]
        .into_iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| match result.exit_code {
            Some(code) => format!("Compiler exited with code {code}"),
            None => "Compiler was terminated by a signal".to_string(),
        })
}
