//! Planning pipeline
//!
//! Turns a build context plus configuration into a validated
//! [`BuildRecipe`](crate::recipe::BuildRecipe). Phases run strictly in order
//! and the first failure aborts the plan.

pub mod context;
pub mod orchestrator;
pub mod phase_trait;
pub mod phases;

pub use context::PipelineContext;
pub use orchestrator::PipelineOrchestrator;
pub use phase_trait::WorkflowPhase;

use crate::config::VenvpackConfig;
use crate::progress::ProgressHandler;
use crate::recipe::BuildRecipe;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Plan the image for `context_path` with the real file system
pub async fn plan(
    context_path: &Path,
    config: VenvpackConfig,
    progress: Option<Arc<dyn ProgressHandler>>,
) -> Result<BuildRecipe> {
    let mut context = PipelineContext::with_defaults(context_path, config);
    PipelineOrchestrator::new(progress).execute(&mut context).await
}
