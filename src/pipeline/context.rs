//! Pipeline context: long-lived dependencies plus each phase's result

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::VenvpackConfig;
use crate::fs::{FileSystem, RealFileSystem};
use crate::recipe::{BaseRuntime, BuildRecipe, EntryPoint, EnvironmentSpec, SourceSet};
use crate::toolchain::{ToolDetection, ToolRegistry};

pub struct PipelineContext {
    /// Build context root on the host
    pub context_path: PathBuf,

    /// Effective configuration (environment plus flags)
    pub config: VenvpackConfig,

    /// File system abstraction for manifest reads
    pub file_system: Arc<dyn FileSystem>,

    /// Dependency tools known to the planner
    pub tool_registry: Arc<ToolRegistry>,

    pub source: Option<SourceSet>,
    pub base: Option<BaseRuntime>,
    pub detection: Option<ToolDetection>,
    pub environment: Option<EnvironmentSpec>,
    pub entrypoint: Option<EntryPoint>,
    pub project_name: Option<String>,
    pub warnings: Vec<String>,
    pub recipe: Option<BuildRecipe>,
}

impl PipelineContext {
    pub fn new(
        context_path: PathBuf,
        config: VenvpackConfig,
        file_system: Arc<dyn FileSystem>,
        tool_registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            context_path,
            config,
            file_system,
            tool_registry,
            source: None,
            base: None,
            detection: None,
            environment: None,
            entrypoint: None,
            project_name: None,
            warnings: Vec::new(),
            recipe: None,
        }
    }

    /// Context backed by the real file system and the default tools
    pub fn with_defaults(context_path: impl AsRef<Path>, config: VenvpackConfig) -> Self {
        Self::new(
            context_path.as_ref().to_path_buf(),
            config,
            Arc::new(RealFileSystem),
            Arc::new(ToolRegistry::with_defaults()),
        )
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let context = PipelineContext::with_defaults("/tmp/test", VenvpackConfig::builtin());
        assert_eq!(context.context_path, PathBuf::from("/tmp/test"));
        assert!(context.source.is_none());
        assert!(context.recipe.is_none());
        assert!(context.warnings.is_empty());
    }

    #[test]
    fn test_warnings_accumulate() {
        let mut context = PipelineContext::with_defaults("/tmp/test", VenvpackConfig::builtin());
        context.warn("first");
        context.warn(String::from("second"));
        assert_eq!(context.warnings, vec!["first", "second"]);
    }
}
