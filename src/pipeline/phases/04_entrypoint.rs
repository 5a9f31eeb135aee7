use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::recipe::EntryPoint;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Fixes the startup command: the tool's runner over the entry script
///
/// A missing script is not a build failure. The image still builds and the
/// container exits non-zero when it starts, so the planner only warns.
pub struct EntryPointPhase;

#[async_trait]
impl WorkflowPhase for EntryPointPhase {
    fn name(&self) -> &'static str {
        "EntryPointPhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let detection = context
            .detection
            .as_ref()
            .context("Dependency tool must be detected before the entry point")?;
        let source = context
            .source
            .as_ref()
            .context("Build context must be scanned before the entry point")?;
        let tool = context
            .tool_registry
            .get(detection.tool)
            .with_context(|| format!("Dependency tool {} is not registered", detection.tool))?;

        let script = context.config.script.clone();
        let script_present = source.contains(Path::new(&script));
        let command = tool.run_command(&script);

        info!(command = %command.join(" "), "Fixed entry point");

        context.entrypoint = Some(EntryPoint {
            command,
            script: script.clone(),
            script_present,
        });

        if !script_present {
            context.warn(format!(
                "{} is not in the build context; the container will exit with an error at startup",
                script
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VenvpackConfig;
    use crate::recipe::SourceSet;
    use crate::toolchain::{ToolDetection, ToolKind};
    use std::path::PathBuf;

    fn context(tool: ToolKind, files: &[&str]) -> PipelineContext {
        let mut context = PipelineContext::with_defaults("/ctx", VenvpackConfig::builtin());
        context.detection = Some(ToolDetection {
            tool,
            manifest: "pyproject.toml".to_string(),
            lockfile: None,
            priority: 8,
        });
        context.source = Some(SourceSet {
            root: PathBuf::from("/ctx"),
            files: files.iter().map(PathBuf::from).collect(),
            total_bytes: 0,
            dockerignore: false,
        });
        context
    }

    #[tokio::test]
    async fn test_uv_entry_point() {
        let mut context = context(ToolKind::Uv, &["main.py", "pyproject.toml"]);
        EntryPointPhase.execute(&mut context).await.unwrap();

        let entrypoint = context.entrypoint.unwrap();
        assert_eq!(entrypoint.command, vec!["uv", "run", "main.py"]);
        assert!(entrypoint.script_present);
        assert!(context.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_script_only_warns() {
        let mut context = context(ToolKind::Pipenv, &["Pipfile"]);
        EntryPointPhase.execute(&mut context).await.unwrap();

        let entrypoint = context.entrypoint.unwrap();
        assert_eq!(entrypoint.command, vec!["pipenv", "run", "python", "main.py"]);
        assert!(!entrypoint.script_present);
        assert_eq!(context.warnings.len(), 1);
        assert!(context.warnings[0].contains("main.py"));
    }

    #[tokio::test]
    async fn test_requires_detection() {
        let mut context = PipelineContext::with_defaults("/ctx", VenvpackConfig::builtin());
        assert!(EntryPointPhase.execute(&mut context).await.is_err());
    }
}
