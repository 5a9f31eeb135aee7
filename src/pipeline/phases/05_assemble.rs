use crate::error::BuildError;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::recipe::{BuildRecipe, RecipeMetadata, RECIPE_VERSION};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// Combines the phase results into one validated recipe
pub struct AssemblePhase;

#[async_trait]
impl WorkflowPhase for AssemblePhase {
    fn name(&self) -> &'static str {
        "AssemblePhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let base = context.base.clone().context("Base runtime missing")?;
        let source = context.source.clone().context("Source set missing")?;
        let environment = context
            .environment
            .clone()
            .context("Environment spec missing")?;
        let entrypoint = context.entrypoint.clone().context("Entry point missing")?;

        let recipe = BuildRecipe {
            version: RECIPE_VERSION.to_string(),
            metadata: RecipeMetadata {
                project_name: context.project_name.clone(),
                tool: environment.tool.clone(),
                python_version: base.version.clone(),
                fingerprint: environment.fingerprint.clone(),
                warnings: context.warnings.clone(),
            },
            base,
            workdir: context.config.workdir.clone(),
            source,
            environment,
            entrypoint,
        };

        recipe
            .validate()
            .map_err(|e| BuildError::InvalidRecipe(e.to_string()))?;
        debug!("Recipe validated");

        context.recipe = Some(recipe);
        Ok(())
    }
}
