//! Dependency-management tools
//!
//! Each tool knows which manifests it owns, how to install itself into the base
//! runtime, how to create and fill the isolated environment, and which command
//! runs a script inside that environment.

pub mod pipenv;
pub mod poetry;
pub mod python_common;
pub mod registry;
pub mod uv;

pub use pipenv::PipenvTool;
pub use poetry::PoetryTool;
pub use registry::{ToolDetection, ToolRegistry};
pub use uv::UvTool;

use crate::recipe::{BuildStep, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Uv,
    Poetry,
    Pipenv,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Uv => "uv",
            ToolKind::Poetry => "poetry",
            ToolKind::Pipenv => "pipenv",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uv" => Ok(ToolKind::Uv),
            "poetry" => Ok(ToolKind::Poetry),
            "pipenv" => Ok(ToolKind::Pipenv),
            other => Err(format!(
                "Invalid tool: {}. Valid options: uv, poetry, pipenv",
                other
            )),
        }
    }
}

/// Manifest file a tool can claim
#[derive(Debug, Clone, Copy)]
pub struct ManifestPattern {
    pub filename: &'static str,
    pub priority: u8,
}

/// Everything a tool needs to lay out its provisioning steps
#[derive(Debug, Clone)]
pub struct ProvisionInput<'a> {
    /// Interpreter of the base runtime ("python")
    pub interpreter: &'a str,
    /// Pin for the tool itself
    pub tool_version: Option<&'a str>,
    /// Absolute working directory
    pub workdir: &'a Path,
    /// Environment directory relative to the workdir
    pub venv_dir: &'a str,
    /// Manifest file name at the workdir root
    pub manifest: &'a str,
    /// Lock file name, when one is present
    pub lockfile: Option<&'a str>,
}

impl ProvisionInput<'_> {
    pub fn venv_path(&self) -> PathBuf {
        self.workdir.join(self.venv_dir)
    }
}

pub trait DependencyTool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// PyPI package that provides the tool
    fn package(&self) -> &'static str {
        self.kind().name()
    }

    /// Manifest files this tool may own
    fn manifest_patterns(&self) -> &[ManifestPattern];

    /// Lock file that pins the resolution, if the tool has one
    fn lockfile(&self) -> Option<&'static str>;

    /// Priority with which this tool claims `manifest`, or `None` if it does not
    ///
    /// `siblings` are the other file names at the context root.
    fn claim(&self, manifest: &str, content: Option<&str>, siblings: &[String]) -> Option<u8> {
        let _ = (content, siblings);
        self.manifest_patterns()
            .iter()
            .find(|p| p.filename == manifest)
            .map(|p| p.priority)
    }

    /// Sub-step 1: install the tool into the base runtime's package space
    fn install_step(&self, interpreter: &str, version: Option<&str>) -> BuildStep {
        let spec = match version {
            Some(v) => format!("{}=={}", self.package(), v),
            None => self.package().to_string(),
        };
        BuildStep::new(
            Stage::ToolInstall,
            format!("Install {}", self.kind()),
            &[interpreter, "-m", "pip", "install", "--no-cache-dir", spec.as_str()],
        )
    }

    /// Sub-step 2: create the environment and install the manifest's dependencies
    fn provision_steps(&self, input: &ProvisionInput<'_>) -> Vec<BuildStep>;

    /// Variables that steer the tool towards the environment directory
    fn environment(&self, input: &ProvisionInput<'_>) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "VIRTUAL_ENV".to_string(),
            input.venv_path().display().to_string(),
        )])
    }

    /// Fixed command that runs `script` inside the environment
    fn run_command(&self, script: &str) -> Vec<String>;
}

/// Step that creates a plain virtual environment with the base interpreter
pub(crate) fn venv_step(input: &ProvisionInput<'_>) -> BuildStep {
    BuildStep::new(
        Stage::DependencyInstall,
        format!("Create virtual environment in {}", input.venv_dir),
        &[input.interpreter, "-m", "venv", input.venv_dir],
    )
}

#[cfg(test)]
pub(crate) fn sample_input<'a>(manifest: &'a str, lockfile: Option<&'a str>) -> ProvisionInput<'a> {
    ProvisionInput {
        interpreter: "python",
        tool_version: None,
        workdir: Path::new("/app"),
        venv_dir: ".venv",
        manifest,
        lockfile,
    }
}
