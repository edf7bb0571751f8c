//! Language runner trait and implementations.
//!
//! A runner materializes the source inside a [`Workspace`], optionally builds
//! it, runs it, and collects the output. Cleanup belongs to the caller that
//! owns the workspace.

mod interpreted;
mod jvm;
mod native;
pub mod process;

pub use interpreted::InterpretedRunner;
pub use jvm::JvmRunner;
pub use native::NativeRunner;

use async_trait::async_trait;

use crate::error::{ExecError, Stage};
use crate::language::{NamingRule, RunnerSpec, TemplateVars};
use crate::naming;
use crate::workspace::Workspace;
use process::{run_step, StepError};

/// Result of running a program to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code of the process (0 = success, -1 = killed by a signal).
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl ExecutionResult {
    /// Caller-facing output: stdout, or stderr when stdout is empty.
    pub fn output(&self) -> &str {
        if self.stdout.is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Strategy for one family of languages.
#[async_trait]
pub trait LanguageRunner: std::fmt::Debug + Send + Sync {
    /// Build (if needed) and run `source` inside `workspace`.
    ///
    /// Every file the runner creates must be registered with the workspace
    /// so the owner can remove it.
    async fn execute(&self, source: &str, workspace: &mut Workspace) -> Result<ExecutionResult, ExecError>;
}

/// File stem for the source artifact under the runner's naming rule.
fn artifact_stem(spec: &RunnerSpec, source: &str) -> String {
    match spec.naming {
        NamingRule::UniqueToken => naming::unique_stem(),
        NamingRule::DeclaredType => naming::declared_class_name(source).to_string(),
    }
}

/// Run one step under the stage's limits and turn a failed exit, a timeout
/// or an output overflow into an [`ExecError`].
async fn checked_step(
    spec: &RunnerSpec,
    stage: Stage,
    argv: &[String],
    workspace: &Workspace,
) -> Result<ExecutionResult, ExecError> {
    let timeout = match stage {
        Stage::Build => spec.build_timeout,
        Stage::Run => spec.run_timeout,
    };
    let to_error = |message: String| match stage {
        Stage::Build => ExecError::build(message),
        Stage::Run => ExecError::run(message),
    };

    let result = run_step(argv, workspace.dir(), timeout, spec.max_output)
        .await
        .map_err(|e| match e {
            StepError::TimedOut(_) | StepError::OutputLimit { .. } => {
                to_error(format!("{e}: {}", argv.join(" ")))
            }
            other => to_error(other.to_string()),
        })?;

    if result.exit_code == 0 {
        Ok(result)
    } else {
        Err(to_error(failure_message(argv, &result)))
    }
}

/// `Command failed: <cmd>` followed by the step's diagnostics.
fn failure_message(argv: &[String], result: &ExecutionResult) -> String {
    let status = if result.exit_code == -1 {
        "terminated by signal".to_string()
    } else {
        format!("exit code {}", result.exit_code)
    };
    let mut message = format!("Command failed ({status}): {}", argv.join(" "));
    let detail = result.stderr.trim_end();
    let detail = if detail.is_empty() { result.stdout.trim_end() } else { detail };
    if !detail.is_empty() {
        message.push('\n');
        message.push_str(detail);
    }
    message
}

/// Placeholder values for a source artifact at `source`.
fn template_vars(workspace: &Workspace, stem: &str, source: &std::path::Path) -> TemplateVars {
    TemplateVars {
        source: source.to_string_lossy().into_owned(),
        binary: workspace.dir().join(stem).to_string_lossy().into_owned(),
        dir: workspace.dir().to_string_lossy().into_owned(),
        name: stem.to_string(),
    }
}
