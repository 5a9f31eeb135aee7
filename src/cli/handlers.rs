//! Command handlers
//!
//! Each handler returns the process exit code. Failures are reported on
//! stderr with the stage that gave up; `run` and `local` return the
//! application's own exit code once it has started.

use crate::cli::commands::{BuildArgs, BuildOverrides, HealthArgs, LocalArgs, PlanArgs, RunArgs};
use crate::cli::output::{OutputFormat, OutputFormatter};
use crate::config::VenvpackConfig;
use crate::docker::{BuildOptions, DockerClient, RunOptions};
use crate::error::BuildError;
use crate::executor::{LocalExecutor, LocalOptions, TokioCommandRunner};
use crate::pipeline;
use crate::progress::{LoggingHandler, ProgressHandler};
use crate::recipe::BuildRecipe;
use crate::util::env_file::{parse_pair, read_env_file};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const FAILURE_EXIT_CODE: i32 = 1;

pub async fn handle_plan(args: &PlanArgs) -> i32 {
    let recipe = match plan_context(args.context.as_deref(), &args.overrides).await {
        Ok(recipe) => recipe,
        Err(e) => return report_error(&e),
    };

    let formatter = OutputFormatter::new(args.format.into());
    let output = match formatter.format_recipe(&recipe) {
        Ok(output) => output,
        Err(e) => return report_error(&e),
    };

    match &args.output {
        Some(path) => {
            if let Err(e) = fs::write(path, ensure_newline(output))
                .with_context(|| format!("Failed to write {}", path.display()))
            {
                return report_error(&e);
            }
            info!("Plan written to {}", path.display());
        }
        None => println!("{}", output.trim_end()),
    }
    0
}

pub async fn handle_build(args: &BuildArgs) -> i32 {
    let recipe = match plan_context(args.context.as_deref(), &args.overrides).await {
        Ok(recipe) => recipe,
        Err(e) => return report_error(&e),
    };

    let client = match DockerClient::connect() {
        Ok(client) => client.with_progress(progress_handler()),
        Err(e) => return report_error(&anyhow::Error::from(e)),
    };

    let options = BuildOptions {
        tag: args
            .tag
            .clone()
            .unwrap_or_else(|| default_tag(recipe.metadata.project_name.as_deref())),
        no_cache: args.no_cache,
        pull: args.pull,
    };

    match client.build(&recipe, &options).await {
        Ok(built) => {
            match OutputFormatter::new(OutputFormat::Human).format_built(&built) {
                Ok(line) => println!("{}", line),
                Err(e) => return report_error(&e),
            }
            0
        }
        Err(e) => report_error(&anyhow::Error::from(e)),
    }
}

pub async fn handle_run(args: &RunArgs) -> i32 {
    let env = match container_env(args.env_file.as_deref(), &args.env) {
        Ok(env) => env,
        Err(e) => return report_error(&e),
    };

    let client = match DockerClient::connect() {
        Ok(client) => client,
        Err(e) => return report_error(&anyhow::Error::from(e)),
    };

    let options = RunOptions {
        env,
        keep: args.keep,
    };
    match client.run(&args.image, &options).await {
        Ok(code) => {
            debug!("Container exit code: {}", code);
            code
        }
        Err(e) => report_error(&e),
    }
}

pub async fn handle_local(args: &LocalArgs) -> i32 {
    let recipe = match plan_context(args.context.as_deref(), &args.overrides).await {
        Ok(recipe) => recipe,
        Err(e) => return report_error(&e),
    };

    let options = LocalOptions {
        root: args.root.clone(),
        interpreter: args.interpreter.clone(),
        force: args.force,
    };
    let executor = LocalExecutor::new(TokioCommandRunner).with_progress(progress_handler());

    match executor.execute(&recipe, &options).await {
        Ok(outcome) => {
            debug!(
                workdir = %outcome.workdir.display(),
                provisioned = outcome.provisioned,
                "Script exited with {}",
                outcome.exit_code
            );
            outcome.exit_code
        }
        Err(e) => report_error(&e),
    }
}

pub async fn handle_health(args: &HealthArgs) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());

    let health = match DockerClient::connect() {
        Ok(client) => client.health().await,
        Err(e) => crate::docker::DaemonHealth {
            reachable: false,
            version: None,
            api_version: None,
            os: None,
            arch: None,
            error: Some(e.to_string()),
        },
    };

    match formatter.format_health(&health) {
        Ok(output) => println!("{}", output),
        Err(e) => return report_error(&e),
    }

    if health.reachable {
        0
    } else {
        FAILURE_EXIT_CODE
    }
}

/// Environment-derived settings with command-line overrides applied
pub fn resolve_config(overrides: &BuildOverrides) -> Result<VenvpackConfig> {
    let config = overrides.apply(VenvpackConfig::from_env()?);
    config.validate()?;
    debug!("{}", config);
    Ok(config)
}

async fn plan_context(context: Option<&Path>, overrides: &BuildOverrides) -> Result<BuildRecipe> {
    let config = resolve_config(overrides)?;
    let path = context_path(context);
    info!("Planning {}", path.display());
    pipeline::plan(&path, config, Some(progress_handler())).await
}

fn context_path(context: Option<&Path>) -> PathBuf {
    let path = context.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    // Canonical so the project name falls back to a real directory name
    fs::canonicalize(&path).unwrap_or(path)
}

fn progress_handler() -> Arc<dyn ProgressHandler> {
    Arc::new(LoggingHandler)
}

/// `KEY=VALUE` list for the container, file entries first and flags overriding
pub fn container_env(env_file: Option<&Path>, pairs: &[String]) -> Result<Vec<String>> {
    let mut env = BTreeMap::new();
    if let Some(path) = env_file {
        env.extend(read_env_file(path)?);
    }
    for raw in pairs {
        let (key, value) = parse_pair(raw)?;
        env.insert(key, value);
    }
    Ok(env.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect())
}

/// Image tag derived from the project name, `app:latest` when there is none
pub fn default_tag(project_name: Option<&str>) -> String {
    let repository: String = project_name
        .unwrap_or_default()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let repository = repository.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    if repository.is_empty() {
        "app:latest".to_string()
    } else {
        format!("{}:latest", repository)
    }
}

fn ensure_newline(mut output: String) -> String {
    if !output.ends_with('\n') {
        output.push('\n');
    }
    output
}

fn report_error(err: &anyhow::Error) -> i32 {
    match err.chain().find_map(|cause| cause.downcast_ref::<BuildError>()) {
        Some(build_error) => match build_error.stage() {
            Some(stage) => eprintln!("Error [{}]: {:#}", stage, err),
            None => eprintln!("Error: {:#}", err),
        },
        None => eprintln!("Error: {:#}", err),
    }
    FAILURE_EXIT_CODE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;
    use yare::parameterized;

    #[parameterized(
        simple = { Some("jobs"), "jobs:latest" },
        mixed_case = { Some("Jobs Scraper"), "jobs-scraper:latest" },
        punctuation = { Some("_jobs.v2_"), "jobs.v2:latest" },
        missing = { None, "app:latest" },
        unusable = { Some("@@@"), "app:latest" },
    )]
    fn test_default_tag(name: Option<&str>, expected: &str) {
        assert_eq!(default_tag(name), expected);
    }

    #[test]
    fn test_container_env_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let env_file = dir.path().join(".env");
        fs::write(&env_file, "# settings\nAPI_URL=https://example.test\nMODE=file\n").unwrap();

        let env = container_env(
            Some(&env_file),
            &["MODE=flag".to_string(), "TOKEN=a=b".to_string()],
        )
        .unwrap();

        assert_eq!(
            env,
            vec!["API_URL=https://example.test", "MODE=flag", "TOKEN=a=b"]
        );
    }

    #[test]
    fn test_container_env_rejects_malformed_pair() {
        assert!(container_env(None, &["NOEQUALS".to_string()]).is_err());
    }

    #[test]
    #[serial]
    fn test_resolve_config_applies_overrides() {
        std::env::set_var("VENVPACK_SCRIPT", "env.py");
        std::env::set_var("VENVPACK_PYTHON_VERSION", "3.10");
        let overrides = BuildOverrides {
            python: Some("3.11".to_string()),
            ..Default::default()
        };

        let config = resolve_config(&overrides).unwrap();
        std::env::remove_var("VENVPACK_SCRIPT");
        std::env::remove_var("VENVPACK_PYTHON_VERSION");

        assert_eq!(config.script, "env.py");
        assert_eq!(config.python_version.as_deref(), Some("3.11"));
    }

    #[test]
    #[serial]
    fn test_resolve_config_rejects_relative_workdir() {
        let overrides = BuildOverrides {
            workdir: Some("app".to_string()),
            ..Default::default()
        };
        assert!(resolve_config(&overrides).is_err());
    }

    #[test]
    fn test_report_error_exit_code() {
        let err: anyhow::Error = BuildError::MissingManifest(PathBuf::from("/ctx")).into();
        assert_eq!(report_error(&err), FAILURE_EXIT_CODE);
    }

    #[tokio::test]
    #[serial]
    async fn test_handle_plan_writes_output_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.py"), "print('ok')\n").unwrap();
        fs::write(dir.path().join("requirements.txt"), "requests\n").unwrap();
        let out = dir.path().join("recipe.json");

        let args = PlanArgs {
            context: Some(dir.path().to_path_buf()),
            format: crate::cli::commands::OutputFormatArg::Json,
            output: Some(out.clone()),
            overrides: BuildOverrides::default(),
        };
        assert_eq!(handle_plan(&args).await, 0);

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(value["environment"]["manifest"], "requirements.txt");
        assert_eq!(value["entrypoint"]["command"][0], "uv");
    }

    #[tokio::test]
    #[serial]
    async fn test_handle_plan_missing_manifest_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.py"), "print('ok')\n").unwrap();

        let args = PlanArgs {
            context: Some(dir.path().to_path_buf()),
            format: crate::cli::commands::OutputFormatArg::Human,
            output: None,
            overrides: BuildOverrides::default(),
        };
        assert_eq!(handle_plan(&args).await, FAILURE_EXIT_CODE);
    }
}
