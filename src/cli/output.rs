//! Output formatting for plans, builds and daemon health
//!
//! JSON and YAML are meant for scripts; the human format mirrors what an
//! operator reads in a terminal.

use anyhow::{Context, Result};

use crate::docker::{BuiltImage, DaemonHealth};
use crate::recipe::{BuildRecipe, Dockerfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
    /// The Dockerfile the build sends to the daemon
    Dockerfile,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn format_recipe(&self, recipe: &BuildRecipe) -> Result<String> {
        match self.format {
            OutputFormat::Json => recipe.to_json(),
            OutputFormat::Yaml => recipe.to_yaml(),
            OutputFormat::Human => Ok(recipe.to_string()),
            OutputFormat::Dockerfile => Ok(Dockerfile::from_recipe(recipe).render()),
        }
    }

    pub fn format_built(&self, built: &BuiltImage) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(built).context("Failed to serialize build result to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(built).context("Failed to serialize build result to YAML")
            }
            OutputFormat::Human | OutputFormat::Dockerfile => {
                let id = built.id.as_deref().map(short_id).unwrap_or("unknown id");
                Ok(format!(
                    "Built {} ({}) in {:.1}s, {} steps",
                    built.tag,
                    id,
                    built.duration_ms as f64 / 1000.0,
                    built.steps
                ))
            }
        }
    }

    pub fn format_health(&self, health: &DaemonHealth) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(health).context("Failed to serialize health to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(health).context("Failed to serialize health to YAML")
            }
            OutputFormat::Human | OutputFormat::Dockerfile => Ok(format_health_human(health)),
        }
    }
}

fn format_health_human(health: &DaemonHealth) -> String {
    let mut lines = Vec::new();
    if health.reachable {
        lines.push("Docker daemon: ✓ reachable".to_string());
    } else {
        lines.push("Docker daemon: ✗ unreachable".to_string());
    }
    if let Some(version) = &health.version {
        lines.push(format!("  Version:     {}", version));
    }
    if let Some(api) = &health.api_version {
        lines.push(format!("  API version: {}", api));
    }
    if let (Some(os), Some(arch)) = (&health.os, &health.arch) {
        lines.push(format!("  Platform:    {}/{}", os, arch));
    }
    if let Some(error) = &health.error {
        lines.push(format!("  Error:       {}", error));
    }
    lines.join("\n")
}

fn short_id(id: &str) -> &str {
    let digest = id.strip_prefix("sha256:").unwrap_or(id);
    digest.get(..12).unwrap_or(digest)
}
