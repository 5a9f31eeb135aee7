//! uv (Python)

use super::{DependencyTool, ManifestPattern, ProvisionInput, ToolKind};
use crate::recipe::{BuildStep, Stage};
use std::collections::BTreeMap;

const PATTERNS: &[ManifestPattern] = &[
    ManifestPattern {
        filename: "pyproject.toml",
        priority: 8,
    },
    ManifestPattern {
        filename: "requirements.txt",
        priority: 5,
    },
];

const LOCKFILE: &str = "uv.lock";

pub struct UvTool;

impl DependencyTool for UvTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Uv
    }

    fn manifest_patterns(&self) -> &[ManifestPattern] {
        PATTERNS
    }

    fn lockfile(&self) -> Option<&'static str> {
        Some(LOCKFILE)
    }

    fn claim(&self, manifest: &str, content: Option<&str>, siblings: &[String]) -> Option<u8> {
        let pattern = PATTERNS.iter().find(|p| p.filename == manifest)?;
        if siblings.iter().any(|s| s == LOCKFILE) && manifest == "pyproject.toml" {
            return Some(20);
        }
        if manifest == "pyproject.toml" && content.is_some_and(|c| c.contains("[tool.poetry]")) {
            return None;
        }
        Some(pattern.priority)
    }

    fn provision_steps(&self, input: &ProvisionInput<'_>) -> Vec<BuildStep> {
        let mut steps = vec![BuildStep::new(
            Stage::DependencyInstall,
            format!("Create virtual environment in {}", input.venv_dir),
            &["uv", "venv", "--allow-existing", input.venv_dir],
        )];

        if input.manifest == "requirements.txt" {
            let python = format!("{}/bin/python", input.venv_dir);
            steps.push(BuildStep::new(
                Stage::DependencyInstall,
                "Install requirements",
                &["uv", "pip", "install", "--python", python.as_str(), "-r", "requirements.txt"],
            ));
        } else if input.lockfile.is_some() {
            steps.push(BuildStep::new(
                Stage::DependencyInstall,
                "Sync locked dependencies",
                &["uv", "sync", "--frozen"],
            ));
        } else {
            steps.push(BuildStep::new(
                Stage::DependencyInstall,
                "Sync dependencies",
                &["uv", "sync"],
            ));
        }

        steps
    }

    fn environment(&self, input: &ProvisionInput<'_>) -> BTreeMap<String, String> {
        let venv = input.venv_path().display().to_string();
        BTreeMap::from([
            ("UV_PROJECT_ENVIRONMENT".to_string(), venv.clone()),
            ("UV_PYTHON_DOWNLOADS".to_string(), "never".to_string()),
            ("VIRTUAL_ENV".to_string(), venv),
        ])
    }

    fn run_command(&self, script: &str) -> Vec<String> {
        vec!["uv".to_string(), "run".to_string(), script.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::sample_input;

    #[test]
    fn test_claims() {
        let none: Vec<String> = vec![];
        let locked = vec!["uv.lock".to_string()];

        assert_eq!(UvTool.claim("pyproject.toml", Some("[project]\n"), &none), Some(8));
        assert_eq!(UvTool.claim("pyproject.toml", Some("[project]\n"), &locked), Some(20));
        assert_eq!(UvTool.claim("requirements.txt", Some(""), &none), Some(5));
        assert_eq!(UvTool.claim("pyproject.toml", Some("[tool.poetry]\n"), &none), None);
        assert_eq!(UvTool.claim("Pipfile", None, &none), None);
    }

    #[test]
    fn test_locked_pyproject_is_frozen() {
        let steps = UvTool.provision_steps(&sample_input("pyproject.toml", Some("uv.lock")));
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].argv(), vec!["uv", "venv", "--allow-existing", ".venv"]);
        assert_eq!(steps[1].argv(), vec!["uv", "sync", "--frozen"]);
        assert!(steps.iter().all(|s| s.stage == Stage::DependencyInstall));
    }

    #[test]
    fn test_requirements_installs_into_venv() {
        let steps = UvTool.provision_steps(&sample_input("requirements.txt", None));
        assert_eq!(
            steps[1].argv(),
            vec!["uv", "pip", "install", "--python", ".venv/bin/python", "-r", "requirements.txt"]
        );
    }

    #[test]
    fn test_environment_points_at_venv() {
        let env = UvTool.environment(&sample_input("pyproject.toml", None));
        assert_eq!(env["UV_PROJECT_ENVIRONMENT"], "/app/.venv");
        assert_eq!(env["VIRTUAL_ENV"], "/app/.venv");
        assert_eq!(env["UV_PYTHON_DOWNLOADS"], "never");
    }

    #[test]
    fn test_run_command() {
        assert_eq!(UvTool.run_command("main.py"), vec!["uv", "run", "main.py"]);
    }
}
