//! Pipenv (Python)

use super::{venv_step, DependencyTool, ManifestPattern, ProvisionInput, ToolKind};
use crate::recipe::{BuildStep, Stage};
use std::collections::BTreeMap;

const PATTERNS: &[ManifestPattern] = &[ManifestPattern {
    filename: "Pipfile",
    priority: 10,
}];

pub struct PipenvTool;

impl DependencyTool for PipenvTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Pipenv
    }

    fn manifest_patterns(&self) -> &[ManifestPattern] {
        PATTERNS
    }

    fn lockfile(&self) -> Option<&'static str> {
        Some("Pipfile.lock")
    }

    fn provision_steps(&self, input: &ProvisionInput<'_>) -> Vec<BuildStep> {
        let install = if input.lockfile.is_some() {
            BuildStep::new(
                Stage::DependencyInstall,
                "Install locked dependencies",
                &["pipenv", "install", "--deploy"],
            )
        } else {
            BuildStep::new(
                Stage::DependencyInstall,
                "Resolve and install dependencies",
                &["pipenv", "install"],
            )
        };

        vec![venv_step(input), install]
    }

    fn environment(&self, input: &ProvisionInput<'_>) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("PIPENV_NOSPIN".to_string(), "1".to_string()),
            ("PIPENV_VENV_IN_PROJECT".to_string(), "1".to_string()),
            (
                "VIRTUAL_ENV".to_string(),
                input.venv_path().display().to_string(),
            ),
        ])
    }

    fn run_command(&self, script: &str) -> Vec<String> {
        vec![
            "pipenv".to_string(),
            "run".to_string(),
            "python".to_string(),
            script.to_string(),
        ]
    }
}
