use crate::context::ContextScanner;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

/// Collects the files copied into the working directory
pub struct ScanPhase;

#[async_trait]
impl WorkflowPhase for ScanPhase {
    fn name(&self) -> &'static str {
        "ScanPhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let start = Instant::now();
        let source = ContextScanner::new(&context.context_path).scan()?;

        info!(
            files = source.files.len(),
            bytes = source.total_bytes,
            dockerignore = source.dockerignore,
            scan_time_ms = start.elapsed().as_millis(),
            "Scanned build context"
        );

        if source.files.is_empty() {
            context.warn(format!(
                "Build context {} is empty",
                context.context_path.display()
            ));
        }

        context.source = Some(source);
        Ok(())
    }
}
