//! Runner for JVM languages, where the file must be named after its class.

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{artifact_stem, checked_step, template_vars, ExecutionResult, LanguageRunner};
use crate::error::{ExecError, Stage};
use crate::language::RunnerSpec;
use crate::workspace::Workspace;

/// Saves `<Class>.java`, compiles it to `<Class>.class`, runs `<Class>`.
///
/// The class-derived names are only unique within the request's workspace,
/// which is why every execution gets its own directory.
#[derive(Debug, Clone)]
pub struct JvmRunner {
    spec: RunnerSpec,
}

impl JvmRunner {
    pub const fn new(spec: RunnerSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl LanguageRunner for JvmRunner {
    #[instrument(skip(self, source, workspace), fields(workspace = %workspace.id()))]
    async fn execute(&self, source: &str, workspace: &mut Workspace) -> Result<ExecutionResult, ExecError> {
        let class_name = artifact_stem(&self.spec, source);
        let file_name = format!("{class_name}.{}", self.spec.extension);
        let source_path = workspace
            .write_artifact(&file_name, source)
            .await
            .map_err(|e| ExecError::build(format!("Failed to write {file_name}: {e}")))?;
        workspace.track(&format!("{class_name}.class"));

        let vars = template_vars(workspace, &class_name, &source_path);

        if let Some(build) = &self.spec.build {
            let argv = build.render(&vars);
            debug!(class = %class_name, "Compiling");
            checked_step(&self.spec, Stage::Build, &argv, workspace).await?;
        }

        let argv = self.spec.run.render(&vars);
        debug!(class = %class_name, "Running class");
        checked_step(&self.spec, Stage::Run, &argv, workspace).await
    }
}
