//! Runner for languages compiled ahead of time to a standalone executable.

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{artifact_stem, checked_step, template_vars, ExecutionResult, LanguageRunner};
use crate::error::{ExecError, Stage};
use crate::language::RunnerSpec;
use crate::workspace::Workspace;

/// Compiles `temp_<token>.<ext>` to `temp_<token>` and executes it directly.
#[derive(Debug, Clone)]
pub struct NativeRunner {
    spec: RunnerSpec,
}

impl NativeRunner {
    pub const fn new(spec: RunnerSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl LanguageRunner for NativeRunner {
    #[instrument(skip(self, source, workspace), fields(workspace = %workspace.id()))]
    async fn execute(&self, source: &str, workspace: &mut Workspace) -> Result<ExecutionResult, ExecError> {
        let stem = artifact_stem(&self.spec, source);
        let file_name = format!("{stem}.{}", self.spec.extension);
        let source_path = workspace
            .write_artifact(&file_name, source)
            .await
            .map_err(|e| ExecError::build(format!("Failed to write {file_name}: {e}")))?;
        // The executable is the source path with its extension stripped.
        workspace.track(&stem);

        let vars = template_vars(workspace, &stem, &source_path);

        if let Some(build) = &self.spec.build {
            let argv = build.render(&vars);
            debug!(artifact = %file_name, "Compiling");
            checked_step(&self.spec, Stage::Build, &argv, workspace).await?;
        }

        let argv = self.spec.run.render(&vars);
        debug!(binary = %vars.binary, "Running executable");
        checked_step(&self.spec, Stage::Run, &argv, workspace).await
    }
}
