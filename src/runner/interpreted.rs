//! Runner for languages executed straight from source by an interpreter.

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{artifact_stem, checked_step, template_vars, ExecutionResult, LanguageRunner};
use crate::error::{ExecError, Stage};
use crate::language::RunnerSpec;
use crate::workspace::Workspace;

/// Writes the source under a unique name and hands it to the interpreter.
#[derive(Debug, Clone)]
pub struct InterpretedRunner {
    spec: RunnerSpec,
}

impl InterpretedRunner {
    pub const fn new(spec: RunnerSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl LanguageRunner for InterpretedRunner {
    #[instrument(skip(self, source, workspace), fields(workspace = %workspace.id()))]
    async fn execute(&self, source: &str, workspace: &mut Workspace) -> Result<ExecutionResult, ExecError> {
        let stem = artifact_stem(&self.spec, source);
        let file_name = format!("{stem}.{}", self.spec.extension);
        let source_path = workspace
            .write_artifact(&file_name, source)
            .await
            .map_err(|e| ExecError::run(format!("Failed to write {file_name}: {e}")))?;

        let vars = template_vars(workspace, &stem, &source_path);

        // Optional check pass before running, e.g. `python3 -m py_compile`
        if let Some(build) = &self.spec.build {
            let argv = build.render(&vars);
            debug!(artifact = %file_name, "Checking source");
            checked_step(&self.spec, Stage::Build, &argv, workspace).await?;
        }

        let argv = self.spec.run.render(&vars);
        debug!(artifact = %file_name, "Running interpreter");

        checked_step(&self.spec, Stage::Run, &argv, workspace).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::language::CommandTemplate;
    use crate::runner::test_support::sh_interpreted;

    /// Returns the outcome and how many entries were left in the work root.
    async fn run(source: &str, timeout: Duration) -> (Result<ExecutionResult, ExecError>, usize) {
        run_spec(sh_interpreted(timeout), source).await
    }

    async fn run_spec(spec: RunnerSpec, source: &str) -> (Result<ExecutionResult, ExecError>, usize) {
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(root.path()).await.unwrap();
        let result = InterpretedRunner::new(spec).execute(source, &mut ws).await;
        ws.cleanup().await;
        let leftovers = std::fs::read_dir(root.path()).unwrap().count();
        (result, leftovers)
    }

    #[tokio::test]
    async fn prints_literal() {
        let (result, leftovers) = run("echo 'Hello World!'", Duration::from_secs(5)).await;
        let result = result.unwrap();
        assert_eq!(result.output(), "Hello World!\n");
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn stderr_only_program_still_surfaces() {
        let (result, _) = run("echo 'to stderr' >&2", Duration::from_secs(5)).await;
        assert_eq!(result.unwrap().output(), "to stderr\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_run_failure() {
        let (result, leftovers) = run("echo boom >&2; exit 2", Duration::from_secs(5)).await;
        let err = result.unwrap_err();
        assert!(matches!(err, ExecError::Run { .. }));
        assert!(err.to_string().contains("boom"));
        assert!(err.to_string().contains("exit code 2"));
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn timeout_is_bounded_run_failure() {
        let started = Instant::now();
        let (result, leftovers) = run("sleep 10", Duration::from_millis(300)).await;
        let err = result.unwrap_err();
        assert!(matches!(err, ExecError::Run { .. }));
        assert!(err.to_string().starts_with("Command timed out after 300ms"));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn flooding_output_is_cut_off() {
        let spec = RunnerSpec {
            max_output: 64 * 1024,
            ..sh_interpreted(Duration::from_secs(5))
        };
        let started = Instant::now();
        let (result, leftovers) = run_spec(spec, "head -c 50000000 /dev/zero | tr '\\0' a").await;
        let err = result.unwrap_err();
        assert!(matches!(err, ExecError::Run { .. }));
        assert!(err.to_string().starts_with("stdout maxBuffer length exceeded"));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn configured_check_runs_before_interpreter() {
        let spec = RunnerSpec {
            build: Some(CommandTemplate::new(["sh", "-n", "{source}"])),
            ..sh_interpreted(Duration::from_secs(5))
        };

        let (ok, _) = run_spec(spec.clone(), "echo checked").await;
        assert_eq!(ok.unwrap().output(), "checked\n");

        // The syntax error stops it before `echo` ever runs.
        let (err, leftovers) = run_spec(spec, "echo never\nif then fi (\n").await;
        let err = err.unwrap_err();
        assert!(matches!(err, ExecError::Build { .. }));
        assert!(!err.to_string().contains("never\n"));
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn real_python_when_available() {
        if std::process::Command::new("python3").arg("--version").output().is_err() {
            return;
        }
        let spec = crate::language::Language::Python.default_spec().unwrap();
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(root.path()).await.unwrap();
        let result = InterpretedRunner::new(spec)
            .execute("print('Hello from Python')", &mut ws)
            .await
            .unwrap();
        ws.cleanup().await;
        assert_eq!(result.output(), "Hello from Python\n");
    }
}
