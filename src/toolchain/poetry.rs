//! Poetry (Python)

use super::{venv_step, DependencyTool, ManifestPattern, ProvisionInput, ToolKind};
use crate::recipe::{BuildStep, Stage};
use std::collections::BTreeMap;

const PATTERNS: &[ManifestPattern] = &[ManifestPattern {
    filename: "pyproject.toml",
    priority: 12,
}];

const LOCKFILE: &str = "poetry.lock";

pub struct PoetryTool;

impl DependencyTool for PoetryTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Poetry
    }

    fn manifest_patterns(&self) -> &[ManifestPattern] {
        PATTERNS
    }

    fn lockfile(&self) -> Option<&'static str> {
        Some(LOCKFILE)
    }

    fn claim(&self, manifest: &str, content: Option<&str>, siblings: &[String]) -> Option<u8> {
        if manifest != "pyproject.toml" {
            return None;
        }
        if siblings.iter().any(|s| s == LOCKFILE) {
            return Some(18);
        }
        match content {
            Some(c) if c.contains("[tool.poetry]") => Some(PATTERNS[0].priority),
            _ => None,
        }
    }

    fn provision_steps(&self, input: &ProvisionInput<'_>) -> Vec<BuildStep> {
        vec![
            venv_step(input),
            BuildStep::new(
                Stage::DependencyInstall,
                if input.lockfile.is_some() {
                    "Install locked dependencies"
                } else {
                    "Resolve and install dependencies"
                },
                &["poetry", "install", "--no-root", "--no-interaction"],
            ),
        ]
    }

    fn environment(&self, input: &ProvisionInput<'_>) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("POETRY_NO_INTERACTION".to_string(), "1".to_string()),
            ("POETRY_VIRTUALENVS_CREATE".to_string(), "false".to_string()),
            (
                "VIRTUAL_ENV".to_string(),
                input.venv_path().display().to_string(),
            ),
        ])
    }

    fn run_command(&self, script: &str) -> Vec<String> {
        vec![
            "poetry".to_string(),
            "run".to_string(),
            "python".to_string(),
            script.to_string(),
        ]
    }
}
