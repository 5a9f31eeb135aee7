//! Configuration management for venvpack
//!
//! Settings are loaded from environment variables with defaults and may be
//! overridden by command-line flags before the pipeline runs.
//!
//! # Environment Variables
//!
//! - `VENVPACK_PYTHON_VERSION`: Pin the interpreter version (e.g. "3.11"). Unset means
//!   detect from `.python-version`, `runtime.txt` or `pyproject.toml`, then "3.12"
//! - `VENVPACK_BASE_IMAGE`: Full base image reference, overrides `python:<version>-slim`
//! - `VENVPACK_WORKDIR`: Working directory inside the image - default: "/app"
//! - `VENVPACK_VENV_DIR`: Environment directory relative to the workdir - default: ".venv"
//! - `VENVPACK_SCRIPT`: Entry-point script - default: "main.py"
//! - `VENVPACK_TOOL`: Force a dependency tool (uv|poetry|pipenv) - default: auto-detect
//! - `VENVPACK_TOOL_VERSION`: Pin the dependency tool version installed with pip
//! - `VENVPACK_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use venvpack::VenvpackConfig;
//!
//! let config = VenvpackConfig::default();
//! config.validate().expect("Invalid configuration");
//! ```

use crate::toolchain::ToolKind;
use regex::Regex;
use std::env;
use std::fmt;
use std::path::{Component, Path};
use thiserror::Error;

pub const DEFAULT_PYTHON_VERSION: &str = "3.12";
pub const DEFAULT_WORKDIR: &str = "/app";
pub const DEFAULT_VENV_DIR: &str = ".venv";
pub const DEFAULT_SCRIPT: &str = "main.py";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid dependency tool: {0}. Valid options: uv, poetry, pipenv")]
    InvalidTool(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Build-time settings shared by every stage
#[derive(Debug, Clone, PartialEq)]
pub struct VenvpackConfig {
    /// Pinned interpreter version; `None` means detect from the context
    pub python_version: Option<String>,

    /// Explicit base image reference
    pub base_image: Option<String>,

    /// Absolute working directory inside the image
    pub workdir: String,

    /// Environment directory, relative to the working directory
    pub venv_dir: String,

    /// Entry-point script, relative to the working directory
    pub script: String,

    /// Forced dependency tool; `None` means detect from manifests
    pub tool: Option<ToolKind>,

    /// Version pin for the dependency tool itself
    pub tool_version: Option<String>,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for VenvpackConfig {
    /// Loads configuration from `VENVPACK_*` environment variables
    ///
    /// An unparseable `VENVPACK_TOOL` is ignored here and falls back to
    /// detection; use [`VenvpackConfig::from_env`] to surface it as an error.
    fn default() -> Self {
        Self::from_env().unwrap_or_else(|_| Self::builtin())
    }
}

impl VenvpackConfig {
    /// Hard-coded defaults, ignoring the environment
    pub fn builtin() -> Self {
        Self {
            python_version: None,
            base_image: None,
            workdir: DEFAULT_WORKDIR.to_string(),
            venv_dir: DEFAULT_VENV_DIR.to_string(),
            script: DEFAULT_SCRIPT.to_string(),
            tool: None,
            tool_version: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Loads configuration from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::builtin();

        let tool = match non_empty_var("VENVPACK_TOOL") {
            Some(value) => Some(
                value
                    .parse::<ToolKind>()
                    .map_err(|_| ConfigError::InvalidTool(value))?,
            ),
            None => None,
        };

        Ok(Self {
            python_version: non_empty_var("VENVPACK_PYTHON_VERSION"),
            base_image: non_empty_var("VENVPACK_BASE_IMAGE"),
            workdir: non_empty_var("VENVPACK_WORKDIR").unwrap_or(defaults.workdir),
            venv_dir: non_empty_var("VENVPACK_VENV_DIR").unwrap_or(defaults.venv_dir),
            script: non_empty_var("VENVPACK_SCRIPT").unwrap_or(defaults.script),
            tool,
            tool_version: non_empty_var("VENVPACK_TOOL_VERSION"),
            log_level: non_empty_var("VENVPACK_LOG_LEVEL")
                .unwrap_or(defaults.log_level)
                .to_lowercase(),
        })
    }

    /// Validates the configuration
    ///
    /// Checks that:
    /// - The working directory is absolute
    /// - The environment directory and script stay inside the working directory
    /// - A pinned python version looks like `major.minor[.patch]`
    /// - Log level is valid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.workdir.starts_with('/') {
            return Err(ConfigError::ValidationFailed(format!(
                "workdir must be an absolute path, got '{}'",
                self.workdir
            )));
        }

        ensure_contained("venv_dir", &self.venv_dir)?;
        ensure_contained("script", &self.script)?;

        if let Some(version) = &self.python_version {
            if !is_valid_python_version(version) {
                return Err(ConfigError::ValidationFailed(format!(
                    "python version must look like 3.12 or 3.12.4, got '{}'",
                    version
                )));
            }
        }

        if let Some(image) = &self.base_image {
            if image.trim().is_empty() || image.contains(char::is_whitespace) {
                return Err(ConfigError::ValidationFailed(format!(
                    "base image reference is malformed: '{}'",
                    image
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "log_level must be one of: {}, got '{}'",
                valid_levels.join(", "),
                self.log_level
            )));
        }

        Ok(())
    }
}

impl fmt::Display for VenvpackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "venvpack configuration:")?;
        writeln!(
            f,
            "  Python:      {}",
            self.python_version.as_deref().unwrap_or("auto")
        )?;
        writeln!(
            f,
            "  Base image:  {}",
            self.base_image.as_deref().unwrap_or("python:<version>-slim")
        )?;
        writeln!(f, "  Workdir:     {}", self.workdir)?;
        writeln!(f, "  Venv:        {}", self.venv_dir)?;
        writeln!(f, "  Script:      {}", self.script)?;
        writeln!(
            f,
            "  Tool:        {}",
            self.tool.map(|t| t.to_string()).unwrap_or_else(|| "auto".to_string())
        )?;
        write!(f, "  Log level:   {}", self.log_level)
    }
}

pub(crate) fn is_valid_python_version(version: &str) -> bool {
    let re = Regex::new(r"^3\.\d{1,2}(\.\d{1,3})?$").expect("valid regex");
    re.is_match(version)
}

fn ensure_contained(field: &str, value: &str) -> Result<(), ConfigError> {
    let path = Path::new(value);
    if value.is_empty() || path.is_absolute() {
        return Err(ConfigError::ValidationFailed(format!(
            "{} must be a relative path, got '{}'",
            field, value
        )));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ConfigError::ValidationFailed(format!(
            "{} must not escape the working directory, got '{}'",
            field, value
        )));
    }
    Ok(())
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
