//! Request dispatch: validate the language, provision a workspace, run.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::ExecError;
use crate::language::{Language, RunnerSpec};
use crate::runner::{ExecutionResult, InterpretedRunner, JvmRunner, LanguageRunner, NativeRunner};
use crate::workspace::Workspace;

/// Holds one runner per server-side language.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    work_root: PathBuf,
    python: InterpretedRunner,
    java: JvmRunner,
    cpp: NativeRunner,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Self {
        Self {
            work_root: config.work_root.clone(),
            python: InterpretedRunner::new(config.resolve_spec(Language::Python, RunnerSpec::python())),
            java: JvmRunner::new(config.resolve_spec(Language::Java, RunnerSpec::java())),
            cpp: NativeRunner::new(config.resolve_spec(Language::Cpp, RunnerSpec::cpp())),
        }
    }

    /// Runner responsible for `language`.
    pub fn runner(&self, language: Language) -> Result<&dyn LanguageRunner, ExecError> {
        match language {
            Language::Python => Ok(&self.python),
            Language::Java => Ok(&self.java),
            Language::Cpp => Ok(&self.cpp),
            Language::JavaScript => Err(ExecError::UnsupportedLanguage(language.to_string())),
        }
    }

    /// Execute `code` written in the language tagged `language`.
    ///
    /// Unsupported tags fail before anything touches the filesystem. For
    /// everything else the workspace is removed whatever the outcome.
    #[instrument(skip(self, code), fields(code_len = code.len()))]
    pub async fn execute(&self, language: &str, code: &str) -> Result<ExecutionResult, ExecError> {
        let language = Language::parse_server_side(language)?;
        let runner = self.runner(language)?;

        let mut workspace = Workspace::create(&self.work_root).await?;
        let request_id = workspace.id();
        let started = Instant::now();

        let result = runner.execute(code, &mut workspace).await;
        workspace.cleanup().await;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(r) => info!(%language, %request_id, exit_code = r.exit_code, elapsed_ms, "Execution succeeded"),
            Err(e) => warn!(%language, %request_id, stage = ?e.stage(), elapsed_ms, error = %e, "Execution failed"),
        }

        result
    }
}
