//! Progress handler trait and events

use crate::recipe::Stage;
use std::time::Duration;

/// Events emitted while a context is planned, built or provisioned
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Work on a build context started
    Started { context: String },

    /// Planner phase started
    PhaseStarted { phase: String },

    /// Planner phase finished
    PhaseComplete { phase: String, duration: Duration },

    /// Build or provisioning step started (1-based index)
    StepStarted {
        stage: Stage,
        index: usize,
        total: usize,
        description: String,
    },

    /// Build or provisioning step finished
    StepComplete {
        stage: Stage,
        index: usize,
        duration: Duration,
        success: bool,
    },

    /// Everything succeeded
    Completed { total_time: Duration },

    /// Aborted on the first failure
    Failed { stage: Option<Stage>, error: String },
}

/// Trait for handling progress events
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        NoOpHandler.on_progress(&ProgressEvent::Started {
            context: "/test".to_string(),
        });
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::Started {
            context: "/test".to_string(),
        });
        handler.on_progress(&ProgressEvent::StepStarted {
            stage: Stage::ToolInstall,
            index: 1,
            total: 3,
            description: "Install uv".to_string(),
        });
        handler.on_progress(&ProgressEvent::Completed {
            total_time: Duration::from_secs(5),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ProgressEvent::Failed {
            stage: Some(Stage::DependencyInstall),
            error: "resolution failed".to_string(),
        };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("Failed"));
        assert!(debug_str.contains("DependencyInstall"));
    }
}
