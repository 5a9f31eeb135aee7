use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::recipe::BaseRuntime;
use crate::toolchain::python_common::resolve_python_version;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

const INTERPRETER: &str = "python";

/// Pins the interpreter runtime the image starts from
pub struct BaseImagePhase;

#[async_trait]
impl WorkflowPhase for BaseImagePhase {
    fn name(&self) -> &'static str {
        "BaseImagePhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let resolved = resolve_python_version(
            context.file_system.as_ref(),
            &context.context_path,
            context.config.python_version.as_deref(),
        )?;

        let image = context
            .config
            .base_image
            .clone()
            .unwrap_or_else(|| official_image(&resolved.version));

        info!(
            version = %resolved.version,
            source = %resolved.source,
            image = %image,
            "Pinned base runtime"
        );

        context.base = Some(BaseRuntime {
            family: "python".to_string(),
            version: resolved.version,
            version_source: resolved.source,
            image,
            interpreter: INTERPRETER.to_string(),
        });
        Ok(())
    }
}

/// Slim official image for a `major.minor` version
pub fn official_image(version: &str) -> String {
    format!("python:{}-slim", version)
}
