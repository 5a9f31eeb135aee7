//! Build failure taxonomy
//!
//! Every failure aborts the build immediately. Nothing here is retried; the
//! variant only tells the operator which stage gave up.

use crate::recipe::Stage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Base image '{image}' is unavailable: {reason}")]
    BaseImageUnavailable { image: String, reason: String },

    #[error("Build context {0} does not exist or is not a directory")]
    ContextMissing(PathBuf),

    #[error("Failed to copy {path}: {reason}")]
    SourceCopy { path: PathBuf, reason: String },

    #[error("Failed to install {tool}: {reason}")]
    ToolInstall { tool: String, reason: String },

    #[error("No dependency manifest found in {0} (expected uv.lock, pyproject.toml, requirements.txt, poetry.lock or Pipfile)")]
    MissingManifest(PathBuf),

    #[error("Dependency installation with {tool} failed: {reason}")]
    DependencyResolution { tool: String, reason: String },

    #[error("Docker daemon is unavailable: {0}")]
    DaemonUnavailable(String),

    #[error("Invalid build recipe: {0}")]
    InvalidRecipe(String),
}

impl BuildError {
    /// Stage that was running when the error surfaced
    pub fn stage(&self) -> Option<Stage> {
        match self {
            BuildError::BaseImageUnavailable { .. } => Some(Stage::BaseImage),
            BuildError::ContextMissing(_) | BuildError::SourceCopy { .. } => {
                Some(Stage::SourceCopy)
            }
            BuildError::ToolInstall { .. } => Some(Stage::ToolInstall),
            BuildError::MissingManifest(_) | BuildError::DependencyResolution { .. } => {
                Some(Stage::DependencyInstall)
            }
            BuildError::DaemonUnavailable(_) | BuildError::InvalidRecipe(_) => None,
        }
    }

    /// Build the error that corresponds to a failed recipe step
    pub fn for_stage(stage: Stage, subject: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match stage {
            Stage::BaseImage => BuildError::BaseImageUnavailable {
                image: subject.to_string(),
                reason,
            },
            Stage::SourceCopy => BuildError::SourceCopy {
                path: PathBuf::from(subject),
                reason,
            },
            Stage::ToolInstall => BuildError::ToolInstall {
                tool: subject.to_string(),
                reason,
            },
            Stage::DependencyInstall | Stage::SearchPath | Stage::EntryPoint => {
                BuildError::DependencyResolution {
                    tool: subject.to_string(),
                    reason,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        let err = BuildError::MissingManifest(PathBuf::from("/ctx"));
        assert_eq!(err.stage(), Some(Stage::DependencyInstall));

        let err = BuildError::ContextMissing(PathBuf::from("/nope"));
        assert_eq!(err.stage(), Some(Stage::SourceCopy));

        let err = BuildError::DaemonUnavailable("socket closed".to_string());
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn test_for_stage_round_trips_stage() {
        for stage in [Stage::BaseImage, Stage::SourceCopy, Stage::ToolInstall, Stage::DependencyInstall] {
            let err = BuildError::for_stage(stage, "subject", "boom");
            assert_eq!(err.stage(), Some(stage));
        }
    }

    #[test]
    fn test_display_names_the_image() {
        let err = BuildError::BaseImageUnavailable {
            image: "python:3.12-slim".to_string(),
            reason: "manifest unknown".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("python:3.12-slim"));
        assert!(msg.contains("manifest unknown"));
    }
}
