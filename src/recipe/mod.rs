//! BuildRecipe schema
//!
//! A `BuildRecipe` is the fully resolved plan for one image: the pinned base
//! runtime, the working directory, the provisioning steps that build the
//! isolated environment, the search path mutation, and the fixed entry point.
//! Every stage reads the working directory from the same field, so no stage
//! can diverge from it.

pub mod dockerfile;
pub mod search_path;

pub use dockerfile::{Dockerfile, Instruction};
pub use search_path::SearchPath;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const RECIPE_VERSION: &str = "1.0";

/// Build stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BaseImage,
    SourceCopy,
    ToolInstall,
    DependencyInstall,
    SearchPath,
    EntryPoint,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::BaseImage => "base-image",
            Stage::SourceCopy => "source-copy",
            Stage::ToolInstall => "tool-install",
            Stage::DependencyInstall => "dependency-install",
            Stage::SearchPath => "search-path",
            Stage::EntryPoint => "entry-point",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pinned interpreter runtime the image starts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRuntime {
    /// Interpreter family, always "python" today
    pub family: String,
    /// Pinned interpreter version (e.g. "3.12")
    pub version: String,
    /// Where the version came from (config, .python-version, ...)
    pub version_source: String,
    /// Full image reference (e.g. "python:3.12-slim")
    pub image: String,
    /// Interpreter executable inside the image
    pub interpreter: String,
}

/// One command executed while building the image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    pub stage: Stage,
    pub description: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl BuildStep {
    pub fn new(stage: Stage, description: impl Into<String>, argv: &[&str]) -> Self {
        let (program, args) = argv.split_first().map_or(("", &[][..]), |(p, a)| (*p, a));
        Self {
            stage,
            description: description.into(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Shell rendering, quoting words that need it
    pub fn shell_line(&self) -> String {
        self.argv()
            .iter()
            .map(|w| shell_quote(w))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Files copied into the working directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSet {
    /// Context root on the host
    pub root: PathBuf,
    /// Files relative to the root, sorted
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Sum of file sizes in bytes
    pub total_bytes: u64,
    /// Whether a `.dockerignore` filtered the context
    pub dockerignore: bool,
}

impl SourceSet {
    pub fn contains(&self, relative: &Path) -> bool {
        self.files.binary_search_by(|f| f.as_path().cmp(relative)).is_ok()
    }
}

/// The isolated dependency environment and how to provision it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    /// Dependency tool name ("uv", "poetry", "pipenv")
    pub tool: String,
    /// Version pin applied when installing the tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
    /// Manifest file relative to the working directory
    pub manifest: String,
    /// Lock file relative to the working directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockfile: Option<String>,
    /// Environment directory relative to the working directory
    pub venv_dir: String,
    /// Provisioning steps in execution order
    pub steps: Vec<BuildStep>,
    /// Variables set before provisioning (tool behaviour switches)
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// sha256 over manifest and lock file contents
    pub fingerprint: String,
}

/// Fixed startup command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Full argv, e.g. ["uv", "run", "main.py"]
    pub command: Vec<String>,
    /// Script the command targets, relative to the working directory
    pub script: String,
    /// Whether the script was present in the build context
    pub script_present: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub tool: String,
    pub python_version: String,
    pub fingerprint: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Complete, ordered plan for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecipe {
    pub version: String,
    pub metadata: RecipeMetadata,
    pub base: BaseRuntime,
    /// Absolute working directory inside the image
    pub workdir: String,
    #[serde(skip)]
    pub source: SourceSet,
    pub environment: EnvironmentSpec,
    pub entrypoint: EntryPoint,
}

impl BuildRecipe {
    /// Absolute environment directory under `workdir`
    pub fn venv_path(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.environment.venv_dir)
    }

    /// Executable directory of the environment under `workdir`
    pub fn venv_bin(&self, workdir: &Path) -> PathBuf {
        self.venv_path(workdir).join("bin")
    }

    /// Search path inside the image: environment binaries first
    pub fn image_search_path(&self) -> SearchPath {
        SearchPath::image_default().prepend(self.venv_bin(Path::new(&self.workdir)))
    }

    /// All commands in stage order, for display
    pub fn steps(&self) -> &[BuildStep] {
        &self.environment.steps
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize BuildRecipe to YAML")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize BuildRecipe to JSON")
    }

    /// Validate the recipe structure
    ///
    /// Checks:
    /// - Base image and interpreter are set
    /// - Working directory is absolute and the environment dir is relative
    /// - Provisioning steps are non-empty and in stage order
    /// - Entry point is non-empty
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            anyhow::bail!("Version cannot be empty");
        }
        if self.base.image.is_empty() {
            anyhow::bail!("Base image cannot be empty");
        }
        if self.base.interpreter.is_empty() {
            anyhow::bail!("Base interpreter cannot be empty");
        }
        if !self.workdir.starts_with('/') {
            anyhow::bail!("Working directory must be absolute, got '{}'", self.workdir);
        }
        if self.environment.venv_dir.is_empty() || self.environment.venv_dir.starts_with('/') {
            anyhow::bail!(
                "Environment directory must be relative to the working directory, got '{}'",
                self.environment.venv_dir
            );
        }
        if self.environment.steps.is_empty() {
            anyhow::bail!("Provisioning steps cannot be empty");
        }
        for pair in self.environment.steps.windows(2) {
            if pair[1].stage < pair[0].stage {
                anyhow::bail!(
                    "Step '{}' ({}) runs after a {} step",
                    pair[1].description,
                    pair[1].stage,
                    pair[0].stage
                );
            }
        }
        if let Some(step) = self.environment.steps.iter().find(|s| s.program.is_empty()) {
            anyhow::bail!("Step '{}' has no program", step.description);
        }
        if self.entrypoint.command.is_empty() {
            anyhow::bail!("Entry point command cannot be empty");
        }
        Ok(())
    }
}

impl fmt::Display for BuildRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build Recipe")?;
        writeln!(f, "============")?;
        if let Some(ref name) = self.metadata.project_name {
            writeln!(f, "Project:     {}", name)?;
        }
        writeln!(
            f,
            "Runtime:     {} {} ({})",
            self.base.family, self.base.version, self.base.version_source
        )?;
        writeln!(f, "Base Image:  {}", self.base.image)?;
        writeln!(f, "Workdir:     {}", self.workdir)?;
        writeln!(
            f,
            "Source:      {} files, {} bytes{}",
            self.source.files.len(),
            self.source.total_bytes,
            if self.source.dockerignore {
                " (.dockerignore applied)"
            } else {
                ""
            }
        )?;
        writeln!(f)?;

        writeln!(f, "Environment:")?;
        writeln!(f, "  Tool:        {}", self.environment.tool)?;
        writeln!(f, "  Manifest:    {}", self.environment.manifest)?;
        if let Some(ref lock) = self.environment.lockfile {
            writeln!(f, "  Lock file:   {}", lock)?;
        }
        writeln!(f, "  Directory:   {}", self.environment.venv_dir)?;
        writeln!(f, "  Fingerprint: {}", short_digest(&self.environment.fingerprint))?;
        writeln!(f, "  Steps:")?;
        for step in &self.environment.steps {
            writeln!(f, "    [{}] {}", step.stage, step.shell_line())?;
        }
        writeln!(f, "  PATH:        {}", self.image_search_path())?;
        writeln!(f)?;

        writeln!(f, "Entry Point:  {}", self.entrypoint.command.join(" "))?;
        if !self.entrypoint.script_present {
            writeln!(
                f,
                "  warning: {} is missing from the build context",
                self.entrypoint.script
            )?;
        }
        for warning in &self.metadata.warnings {
            writeln!(f, "warning: {}", warning)?;
        }

        Ok(())
    }
}

fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

pub(crate) fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn sample_recipe() -> BuildRecipe {
        BuildRecipe {
            version: RECIPE_VERSION.to_string(),
            metadata: RecipeMetadata {
                project_name: Some("jobs-scraper".to_string()),
                tool: "uv".to_string(),
                python_version: "3.12".to_string(),
                fingerprint: "a".repeat(64),
                warnings: vec![],
            },
            base: BaseRuntime {
                family: "python".to_string(),
                version: "3.12".to_string(),
                version_source: "default".to_string(),
                image: "python:3.12-slim".to_string(),
                interpreter: "python".to_string(),
            },
            workdir: "/app".to_string(),
            source: SourceSet {
                root: PathBuf::from("/ctx"),
                files: vec![PathBuf::from("main.py"), PathBuf::from("pyproject.toml")],
                total_bytes: 42,
                dockerignore: false,
            },
            environment: EnvironmentSpec {
                tool: "uv".to_string(),
                tool_version: None,
                manifest: "pyproject.toml".to_string(),
                lockfile: None,
                venv_dir: ".venv".to_string(),
                steps: vec![
                    BuildStep::new(
                        Stage::ToolInstall,
                        "Install uv",
                        &["python", "-m", "pip", "install", "--no-cache-dir", "uv"],
                    ),
                    BuildStep::new(
                        Stage::DependencyInstall,
                        "Create environment",
                        &["uv", "venv", ".venv"],
                    ),
                    BuildStep::new(Stage::DependencyInstall, "Sync dependencies", &["uv", "sync"]),
                ],
                env: BTreeMap::from([(
                    "UV_PROJECT_ENVIRONMENT".to_string(),
                    "/app/.venv".to_string(),
                )]),
                fingerprint: "a".repeat(64),
            },
            entrypoint: EntryPoint {
                command: vec!["uv".to_string(), "run".to_string(), "main.py".to_string()],
                script: "main.py".to_string(),
                script_present: true,
            },
        }
    }
}
