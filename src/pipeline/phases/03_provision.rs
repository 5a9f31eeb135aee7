use crate::error::BuildError;
use crate::fs::FileSystem;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::recipe::EnvironmentSpec;
use crate::toolchain::python_common::{fingerprint, project_name};
use crate::toolchain::ProvisionInput;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Detects the dependency tool and lays out the environment provisioning steps
pub struct ProvisionPhase;

#[async_trait]
impl WorkflowPhase for ProvisionPhase {
    fn name(&self) -> &'static str {
        "ProvisionPhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let base = context
            .base
            .as_ref()
            .context("Base runtime must be pinned before provisioning")?;

        let fs = context.file_system.as_ref();
        let root = context.context_path.as_path();
        let detection = context
            .tool_registry
            .detect(fs, root, context.config.tool)?;
        let tool = context
            .tool_registry
            .get(detection.tool)
            .with_context(|| format!("Dependency tool {} is not registered", detection.tool))?;

        let manifest_bytes = read_bytes(fs, root, &detection.manifest)?;
        let lock_bytes = match &detection.lockfile {
            Some(lock) => Some(read_bytes(fs, root, lock)?),
            None => None,
        };
        let digest = fingerprint(
            (detection.manifest.as_str(), manifest_bytes.as_slice()),
            detection
                .lockfile
                .as_deref()
                .zip(lock_bytes.as_deref()),
        );

        let input = ProvisionInput {
            interpreter: &base.interpreter,
            tool_version: context.config.tool_version.as_deref(),
            workdir: Path::new(&context.config.workdir),
            venv_dir: &context.config.venv_dir,
            manifest: &detection.manifest,
            lockfile: detection.lockfile.as_deref(),
        };

        let mut steps = vec![tool.install_step(input.interpreter, input.tool_version)];
        steps.extend(tool.provision_steps(&input));

        let environment = EnvironmentSpec {
            tool: tool.kind().to_string(),
            tool_version: context.config.tool_version.clone(),
            manifest: detection.manifest.clone(),
            lockfile: detection.lockfile.clone(),
            venv_dir: context.config.venv_dir.clone(),
            steps,
            env: tool.environment(&input),
            fingerprint: digest,
        };

        let name = if detection.manifest == "pyproject.toml" {
            project_name(&String::from_utf8_lossy(&manifest_bytes))
        } else {
            None
        };

        let unlocked = detection.lockfile.is_none() && detection.manifest != "requirements.txt";
        let lock_name = tool.lockfile();

        info!(
            tool = %environment.tool,
            manifest = %environment.manifest,
            locked = environment.lockfile.is_some(),
            steps = environment.steps.len(),
            "Planned environment provisioning"
        );

        context.project_name = name.or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().to_string())
        });
        context.environment = Some(environment);
        context.detection = Some(detection);

        if unlocked {
            if let Some(lock) = lock_name {
                context.warn(format!(
                    "No {} found; dependency versions are resolved at build time",
                    lock
                ));
            }
        }

        Ok(())
    }
}

fn read_bytes(fs: &dyn FileSystem, root: &Path, name: &str) -> Result<Vec<u8>> {
    fs.read(&root.join(name)).map_err(|e| {
        BuildError::SourceCopy {
            path: root.join(name),
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VenvpackConfig;
    use crate::fs::MockFileSystem;
    use crate::pipeline::phases::base_image::BaseImagePhase;
    use crate::recipe::Stage;
    use crate::toolchain::{ToolKind, ToolRegistry};
    use std::path::PathBuf;
    use std::sync::Arc;

    async fn provisioned(files: &[(&str, &str)], config: VenvpackConfig) -> Result<PipelineContext> {
        let fs = MockFileSystem::new();
        for (name, content) in files {
            fs.add_file(format!("/mock/{}", name), content);
        }
        let mut context = PipelineContext::new(
            PathBuf::from("/mock"),
            config,
            Arc::new(fs),
            Arc::new(ToolRegistry::with_defaults()),
        );
        BaseImagePhase.execute(&mut context).await?;
        ProvisionPhase.execute(&mut context).await?;
        Ok(context)
    }

    #[tokio::test]
    async fn test_uv_locked_project() {
        let context = provisioned(
            &[
                ("pyproject.toml", "[project]\nname = \"jobs-scraper\"\n"),
                ("uv.lock", "version = 1\n"),
            ],
            VenvpackConfig::builtin(),
        )
        .await
        .unwrap();

        let env = context.environment.unwrap();
        assert_eq!(env.tool, "uv");
        assert_eq!(env.lockfile.as_deref(), Some("uv.lock"));
        assert_eq!(env.steps[0].stage, Stage::ToolInstall);
        assert_eq!(
            env.steps[0].argv(),
            vec!["python", "-m", "pip", "install", "--no-cache-dir", "uv"]
        );
        assert_eq!(env.steps.last().unwrap().argv(), vec!["uv", "sync", "--frozen"]);
        assert_eq!(env.env["UV_PROJECT_ENVIRONMENT"], "/app/.venv");
        assert_eq!(context.project_name.as_deref(), Some("jobs-scraper"));
        assert!(context.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_custom_workdir_and_tool_pin() {
        let config = VenvpackConfig {
            workdir: "/srv/app".to_string(),
            venv_dir: "env".to_string(),
            tool_version: Some("1.8.3".to_string()),
            tool: Some(ToolKind::Poetry),
            ..VenvpackConfig::builtin()
        };
        let context = provisioned(&[("pyproject.toml", "[tool.poetry]\nname = \"p\"\n")], config)
            .await
            .unwrap();

        let env = context.environment.unwrap();
        assert_eq!(env.steps[0].args.last().map(String::as_str), Some("poetry==1.8.3"));
        assert_eq!(env.steps[1].argv(), vec!["python", "-m", "venv", "env"]);
        assert_eq!(env.env["VIRTUAL_ENV"], "/srv/app/env");
        assert_eq!(context.warnings.len(), 1);
        assert!(context.warnings[0].contains("poetry.lock"));
    }

    #[tokio::test]
    async fn test_fingerprint_tracks_lock_content() {
        let a = provisioned(
            &[("Pipfile", "[packages]\n"), ("Pipfile.lock", "{\"a\": 1}")],
            VenvpackConfig::builtin(),
        )
        .await
        .unwrap();
        let b = provisioned(
            &[("Pipfile", "[packages]\n"), ("Pipfile.lock", "{\"a\": 2}")],
            VenvpackConfig::builtin(),
        )
        .await
        .unwrap();
        let a_again = provisioned(
            &[("Pipfile", "[packages]\n"), ("Pipfile.lock", "{\"a\": 1}")],
            VenvpackConfig::builtin(),
        )
        .await
        .unwrap();

        let fp = |c: &PipelineContext| c.environment.as_ref().unwrap().fingerprint.clone();
        assert_ne!(fp(&a), fp(&b));
        assert_eq!(fp(&a), fp(&a_again));
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let err = provisioned(&[("main.py", "")], VenvpackConfig::builtin())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingManifest(_))
        ));
    }
}
