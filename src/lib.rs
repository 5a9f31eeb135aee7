//! venvpack - build-and-launch pipeline for Python applications
//!
//! Plans a container image for a Python application and carries it through
//! four ordered stages: a pinned base runtime, the build context copied into
//! a fixed working directory, an isolated environment provisioned by a
//! dependency tool, and a fixed entry point that runs the application's
//! script inside that environment.
//!
//! # Core Concepts
//!
//! - **Recipe**: The complete, ordered plan for one image ([`BuildRecipe`])
//! - **Dependency tool**: uv, poetry or pipenv, detected from the manifests
//!   in the build context ([`toolchain`])
//! - **Search path**: `PATH` with the environment's `bin` directory prepended
//!   exactly once ([`recipe::SearchPath`])
//!
//! # Example Usage
//!
//! ```ignore
//! use venvpack::{pipeline, VenvpackConfig};
//! use std::path::Path;
//!
//! async fn show_plan() -> anyhow::Result<()> {
//!     let recipe = pipeline::plan(Path::new("."), VenvpackConfig::from_env()?, None).await?;
//!     println!("{}", recipe);
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`pipeline`]: Phases that turn a build context into a recipe
//! - [`docker`]: Image builds and container runs through the Docker daemon
//! - [`executor`]: The same stages executed directly on the host

pub mod cli;
pub mod config;
pub mod context;
pub mod docker;
pub mod error;
pub mod executor;
pub mod fs;
pub mod pipeline;
pub mod progress;
pub mod recipe;
pub mod toolchain;
pub mod util;

pub use config::{ConfigError, VenvpackConfig};
pub use error::BuildError;
pub use recipe::{BuildRecipe, BuildStep, Dockerfile, SearchPath, Stage};
pub use toolchain::{DependencyTool, ToolKind, ToolRegistry};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_venvpack() {
        assert_eq!(NAME, "venvpack");
    }
}
