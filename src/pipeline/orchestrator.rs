use super::context::PipelineContext;
use super::phase_trait::WorkflowPhase;
use super::phases::{
    assemble::AssemblePhase, base_image::BaseImagePhase, entrypoint::EntryPointPhase,
    provision::ProvisionPhase, scan::ScanPhase,
};
use crate::error::BuildError;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::recipe::BuildRecipe;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct PipelineOrchestrator {
    progress_handler: Option<Arc<dyn ProgressHandler>>,
}

impl PipelineOrchestrator {
    pub fn new(progress_handler: Option<Arc<dyn ProgressHandler>>) -> Self {
        Self { progress_handler }
    }

    fn phases() -> Vec<Box<dyn WorkflowPhase>> {
        vec![
            Box::new(ScanPhase),
            Box::new(BaseImagePhase),
            Box::new(ProvisionPhase),
            Box::new(EntryPointPhase),
            Box::new(AssemblePhase),
        ]
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress_handler {
            handler.on_progress(&event);
        }
    }

    pub async fn execute(&self, context: &mut PipelineContext) -> Result<BuildRecipe> {
        let start = Instant::now();
        info!("Planning build for: {}", context.context_path.display());

        self.emit(ProgressEvent::Started {
            context: context.context_path.display().to_string(),
        });

        for phase in Self::phases() {
            let phase_name = phase.name();
            debug!("Phase: {}", phase_name);
            self.emit(ProgressEvent::PhaseStarted {
                phase: phase_name.to_string(),
            });

            let phase_start = Instant::now();
            if let Err(err) = phase.execute(context).await {
                self.emit(ProgressEvent::Failed {
                    stage: err.downcast_ref::<BuildError>().and_then(BuildError::stage),
                    error: err.to_string(),
                });
                return Err(err).with_context(|| format!("Phase {} failed", phase_name));
            }

            self.emit(ProgressEvent::PhaseComplete {
                phase: phase_name.to_string(),
                duration: phase_start.elapsed(),
            });
        }

        let recipe = context
            .recipe
            .clone()
            .context("Pipeline finished without producing a recipe")?;

        info!(
            tool = %recipe.environment.tool,
            image = %recipe.base.image,
            "Plan complete"
        );
        self.emit(ProgressEvent::Completed {
            total_time: start.elapsed(),
        });

        Ok(recipe)
    }
}
