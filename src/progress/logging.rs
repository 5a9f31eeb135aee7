//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, error, info};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { context } => {
                info!(context = %context, "Starting");
            }
            ProgressEvent::PhaseStarted { phase } => {
                debug!(phase = %phase, "Starting phase");
            }
            ProgressEvent::PhaseComplete { phase, duration } => {
                debug!(
                    phase = %phase,
                    duration_ms = duration.as_millis(),
                    "Phase complete"
                );
            }
            ProgressEvent::StepStarted {
                stage,
                index,
                total,
                description,
            } => {
                info!(
                    stage = %stage,
                    progress = format!("{}/{}", index, total),
                    "{}",
                    description
                );
            }
            ProgressEvent::StepComplete {
                stage,
                index,
                duration,
                success,
            } => {
                if *success {
                    debug!(
                        stage = %stage,
                        step = index,
                        duration_ms = duration.as_millis(),
                        "Step complete"
                    );
                } else {
                    error!(
                        stage = %stage,
                        step = index,
                        duration_ms = duration.as_millis(),
                        "Step failed"
                    );
                }
            }
            ProgressEvent::Completed { total_time } => {
                info!(total_time_ms = total_time.as_millis(), "Complete");
            }
            ProgressEvent::Failed { stage, error } => match stage {
                Some(stage) => error!(stage = %stage, error = %error, "Failed"),
                None => error!(error = %error, "Failed"),
            },
        }
    }
}
