//! Host execution of a recipe
//!
//! Runs the same four stages as the image build, against the host interpreter
//! and under a root directory that stands in for the image filesystem:
//! `<root>/<workdir>` receives the source and `<root>/<workdir>/<venv>` the
//! environment.

use super::{CommandRunner, Invocation};
use crate::error::BuildError;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::recipe::{BuildRecipe, BuildStep, SearchPath, SourceSet, Stage};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Stamp written inside the environment after a successful provisioning
pub const STAMP_FILE: &str = ".venvpack-stamp.json";

const STAGING_PREFIX: &str = ".venvpack-staging-";
const RETIRED_PREFIX: &str = ".venvpack-retired-";

#[derive(Debug, Clone)]
pub struct LocalOptions {
    /// Directory standing in for the image root
    pub root: PathBuf,
    /// Interpreter used wherever the recipe names the base interpreter
    pub interpreter: String,
    /// Provision even when the stamp matches
    pub force: bool,
}

/// Inputs a provisioned environment was built from
///
/// Fields missing from stamps written by older releases default to empty
/// values, which never match a current run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionStamp {
    pub fingerprint: String,
    pub tool: String,
    #[serde(default)]
    pub tool_version: Option<String>,
    #[serde(default)]
    pub python_version: String,
    /// Host interpreter the environment was created with
    #[serde(default)]
    pub interpreter: String,
    #[serde(default)]
    pub venv_dir: String,
    pub provisioned_at: DateTime<Utc>,
}

impl ProvisionStamp {
    pub fn for_run(recipe: &BuildRecipe, interpreter: &str) -> Self {
        Self {
            fingerprint: recipe.environment.fingerprint.clone(),
            tool: recipe.environment.tool.clone(),
            tool_version: recipe.environment.tool_version.clone(),
            python_version: recipe.base.version.clone(),
            interpreter: interpreter.to_string(),
            venv_dir: recipe.environment.venv_dir.clone(),
            provisioned_at: Utc::now(),
        }
    }

    /// Same inputs as `other`; the provisioning time is not compared
    pub fn covers(&self, other: &ProvisionStamp) -> bool {
        self.fingerprint == other.fingerprint
            && self.tool == other.tool
            && self.tool_version == other.tool_version
            && self.python_version == other.python_version
            && self.interpreter == other.interpreter
            && self.venv_dir == other.venv_dir
    }
}

/// What a host run did and how the script ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalOutcome {
    pub workdir: PathBuf,
    pub provisioned: bool,
    pub exit_code: i32,
}

pub struct LocalExecutor<R: CommandRunner> {
    runner: R,
    progress: Option<Arc<dyn ProgressHandler>>,
}

impl<R: CommandRunner> LocalExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress {
            handler.on_progress(&event);
        }
    }

    pub async fn execute(&self, recipe: &BuildRecipe, options: &LocalOptions) -> Result<LocalOutcome> {
        let start = Instant::now();
        let workdir = host_workdir(&options.root, &recipe.workdir);
        self.emit(ProgressEvent::Started {
            context: recipe.source.root.display().to_string(),
        });

        let result = self.stages(recipe, options, &workdir).await;
        match &result {
            Ok(outcome) => {
                info!(
                    exit_code = outcome.exit_code,
                    provisioned = outcome.provisioned,
                    "Script finished"
                );
                self.emit(ProgressEvent::Completed {
                    total_time: start.elapsed(),
                });
            }
            Err(err) => self.emit(ProgressEvent::Failed {
                stage: err.downcast_ref::<BuildError>().and_then(BuildError::stage),
                error: err.to_string(),
            }),
        }
        result
    }

    async fn stages(
        &self,
        recipe: &BuildRecipe,
        options: &LocalOptions,
        workdir: &Path,
    ) -> Result<LocalOutcome> {
        fs::create_dir_all(&options.root)
            .with_context(|| format!("Failed to create {}", options.root.display()))?;

        // 1. base runtime
        self.check_interpreter(&options.interpreter, &options.root)
            .await?;

        // 2. source
        let venv_dir = recipe.environment.venv_dir.clone();
        let source = without_host_tree(&recipe.source, &options.root, &recipe.workdir);
        let target = workdir.to_path_buf();
        tokio::task::spawn_blocking(move || materialize(&source, &target, &venv_dir))
            .await
            .context("Materialization task panicked")??;
        info!(workdir = %workdir.display(), "Materialized source");

        // 3. environment
        let venv = recipe.venv_path(workdir);
        let env = rebase_env(&recipe.environment.env, &recipe.workdir, workdir);
        let expected = ProvisionStamp::for_run(recipe, &options.interpreter);
        let provisioned = if !options.force && stamp_matches(&venv, &expected) {
            info!(
                fingerprint = %short(&recipe.environment.fingerprint),
                "Environment is up to date, skipping provisioning"
            );
            false
        } else {
            self.provision(recipe, options, workdir, &env).await?;
            write_stamp(&venv, &expected)?;
            true
        };

        let search_path = SearchPath::from_env().prepend(recipe.venv_bin(workdir));
        debug!("PATH={}", search_path);

        // 4. entry point
        let mut launch_env = env;
        launch_env.insert("PATH".to_string(), search_path.to_string());
        let mut argv = recipe.entrypoint.command.clone();
        if let Some(program) = argv.first_mut() {
            if let Some(resolved) = search_path.resolve(program) {
                *program = resolved.display().to_string();
            }
        }
        let invocation = Invocation::new(&argv, workdir).with_env(launch_env);
        info!("Launching {}", recipe.entrypoint.command.join(" "));

        let exit_code = self
            .runner
            .run(&invocation)
            .await
            .with_context(|| format!("Failed to launch {}", recipe.entrypoint.command.join(" ")))?;

        Ok(LocalOutcome {
            workdir: workdir.to_path_buf(),
            provisioned,
            exit_code,
        })
    }

    async fn check_interpreter(&self, interpreter: &str, cwd: &Path) -> Result<()> {
        let invocation = Invocation::new(&[interpreter.to_string(), "--version".to_string()], cwd);
        let reason = match self.runner.run(&invocation).await {
            Ok(0) => return Ok(()),
            Ok(code) => format!("`{} --version` exited with status {}", interpreter, code),
            Err(e) => e.to_string(),
        };
        Err(BuildError::BaseImageUnavailable {
            image: format!("host interpreter {}", interpreter),
            reason,
        }
        .into())
    }

    async fn provision(
        &self,
        recipe: &BuildRecipe,
        options: &LocalOptions,
        workdir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<()> {
        let steps = recipe.steps();
        let total = steps.len();
        let current_path = SearchPath::from_env();

        for (i, step) in steps.iter().enumerate() {
            let index = i + 1;

            if step.stage == Stage::ToolInstall && current_path.resolve(&recipe.environment.tool).is_some() {
                info!(tool = %recipe.environment.tool, "Tool already on PATH, skipping install");
                continue;
            }

            self.emit(ProgressEvent::StepStarted {
                stage: step.stage,
                index,
                total,
                description: step.description.clone(),
            });
            let started = Instant::now();

            let argv = host_argv(step, &recipe.base.interpreter, &options.interpreter);
            let invocation = Invocation::new(&argv, workdir).with_env(env.clone());
            let outcome = self.runner.run(&invocation).await;

            let failure = match outcome {
                Ok(0) => None,
                Ok(code) => Some(format!("`{}` exited with status {}", invocation, code)),
                Err(e) => Some(format!("`{}` could not be started: {}", invocation, e)),
            };

            self.emit(ProgressEvent::StepComplete {
                stage: step.stage,
                index,
                duration: started.elapsed(),
                success: failure.is_none(),
            });

            if let Some(reason) = failure {
                return Err(BuildError::for_stage(step.stage, &recipe.environment.tool, reason).into());
            }
        }

        let bin = recipe.venv_bin(workdir);
        if !bin.is_dir() {
            return Err(BuildError::DependencyResolution {
                tool: recipe.environment.tool.clone(),
                reason: format!("environment has no {}", bin.display()),
            }
            .into());
        }

        Ok(())
    }
}

/// `<root>/<workdir>` with the image workdir's leading `/` dropped
pub fn host_workdir(root: &Path, image_workdir: &str) -> PathBuf {
    root.join(image_workdir.trim_start_matches('/'))
}

/// Replace the image interpreter with the host one; everything else runs as planned
fn host_argv(step: &BuildStep, image_interpreter: &str, host_interpreter: &str) -> Vec<String> {
    let mut argv = step.argv();
    if let Some(program) = argv.first_mut() {
        if program == image_interpreter {
            *program = host_interpreter.to_string();
        }
    }
    argv
}

/// Point variables that name image paths at their host counterparts
fn rebase_env(
    env: &BTreeMap<String, String>,
    image_workdir: &str,
    host_workdir: &Path,
) -> BTreeMap<String, String> {
    let prefix = image_workdir.trim_end_matches('/');
    env.iter()
        .map(|(k, v)| {
            let rebased = if v == prefix {
                host_workdir.display().to_string()
            } else if let Some(rest) = v.strip_prefix(&format!("{}/", prefix)) {
                host_workdir.join(rest).display().to_string()
            } else {
                v.clone()
            };
            (k.clone(), rebased)
        })
        .collect()
}

/// Drop files that lie under the host root when the root sits inside the context
///
/// Without this a nested root is copied into its own working directory on
/// every run. A root equal to the context keeps everything but the working
/// directory itself.
fn without_host_tree(source: &SourceSet, root: &Path, image_workdir: &str) -> SourceSet {
    let (Ok(context), Ok(root)) = (source.root.canonicalize(), root.canonicalize()) else {
        return source.clone();
    };
    let Ok(nested) = root.strip_prefix(&context) else {
        return source.clone();
    };
    let excluded = if nested.as_os_str().is_empty() {
        PathBuf::from(image_workdir.trim_start_matches('/'))
    } else {
        nested.to_path_buf()
    };

    let files: Vec<PathBuf> = source
        .files
        .iter()
        .filter(|f| !f.starts_with(&excluded))
        .cloned()
        .collect();
    let dropped = source.files.len() - files.len();
    if dropped > 0 {
        debug!("Skipping {} context files under {}", dropped, excluded.display());
    }

    SourceSet {
        files,
        ..source.clone()
    }
}

fn stamp_matches(venv: &Path, expected: &ProvisionStamp) -> bool {
    let Ok(content) = fs::read_to_string(venv.join(STAMP_FILE)) else {
        return false;
    };
    match serde_json::from_str::<ProvisionStamp>(&content) {
        Ok(stamp) => stamp.covers(expected) && venv.join("bin").is_dir(),
        Err(e) => {
            warn!("Ignoring unreadable stamp in {}: {}", venv.display(), e);
            false
        }
    }
}

fn write_stamp(venv: &Path, stamp: &ProvisionStamp) -> Result<()> {
    let path = venv.join(STAMP_FILE);
    fs::write(&path, serde_json::to_string_pretty(stamp)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Copy `source` into `workdir` through a staging directory
///
/// The previous tree is replaced only after every file has been copied. An
/// existing environment directory is carried over so an unchanged
/// fingerprint can skip provisioning. On failure the previous tree and its
/// environment are left where they were.
fn materialize(source: &SourceSet, workdir: &Path, venv_dir: &str) -> Result<(), BuildError> {
    materialize_with(source, workdir, venv_dir, swap_into_place)
}

fn materialize_with<F>(
    source: &SourceSet,
    workdir: &Path,
    venv_dir: &str,
    swap: F,
) -> Result<(), BuildError>
where
    F: FnOnce(&Path, &Path, &Path) -> Result<(), BuildError>,
{
    let parent = workdir.parent().ok_or_else(|| BuildError::SourceCopy {
        path: workdir.to_path_buf(),
        reason: "working directory has no parent".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(|e| copy_error(parent, e))?;

    let staging = parent.join(format!("{}{}", STAGING_PREFIX, uuid::Uuid::new_v4()));
    if let Err(err) = copy_tree(source, &staging) {
        discard(&staging);
        return Err(err);
    }

    let old_venv = workdir.join(venv_dir);
    let new_venv = staging.join(venv_dir);
    let carried = old_venv.is_dir() && !new_venv.exists();
    if carried {
        if let Err(err) = carry_venv(&old_venv, &new_venv) {
            discard(&staging);
            return Err(err);
        }
    }

    if let Err(err) = swap(&staging, workdir, parent) {
        if carried && new_venv.is_dir() {
            if let Err(e) = fs::rename(&new_venv, &old_venv) {
                warn!("Failed to return environment to {}: {}", old_venv.display(), e);
            }
        }
        discard(&staging);
        return Err(err);
    }

    Ok(())
}

fn carry_venv(old_venv: &Path, new_venv: &Path) -> Result<(), BuildError> {
    if let Some(venv_parent) = new_venv.parent() {
        fs::create_dir_all(venv_parent).map_err(|e| copy_error(venv_parent, e))?;
    }
    fs::rename(old_venv, new_venv).map_err(|e| copy_error(old_venv, e))?;
    debug!("Carried environment {} into staging", old_venv.display());
    Ok(())
}

/// Move `staging` to `workdir`, retiring the previous tree
///
/// If the final rename fails the retired tree is put back.
fn swap_into_place(staging: &Path, workdir: &Path, parent: &Path) -> Result<(), BuildError> {
    if !workdir.exists() {
        return fs::rename(staging, workdir).map_err(|e| copy_error(workdir, e));
    }

    let retired = parent.join(format!("{}{}", RETIRED_PREFIX, uuid::Uuid::new_v4()));
    fs::rename(workdir, &retired).map_err(|e| copy_error(workdir, e))?;
    if let Err(e) = fs::rename(staging, workdir) {
        if let Err(restore) = fs::rename(&retired, workdir) {
            warn!(
                "Failed to restore {} from {}: {}",
                workdir.display(),
                retired.display(),
                restore
            );
        }
        return Err(copy_error(workdir, e));
    }
    if let Err(e) = fs::remove_dir_all(&retired) {
        warn!("Failed to remove {}: {}", retired.display(), e);
    }
    Ok(())
}

fn discard(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", staging.display(), e);
        }
    }
}

fn copy_tree(source: &SourceSet, staging: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(staging).map_err(|e| copy_error(staging, e))?;

    for relative in &source.files {
        let from = source.root.join(relative);
        let to = staging.join(relative);
        if let Some(dir) = to.parent() {
            fs::create_dir_all(dir).map_err(|e| copy_error(dir, e))?;
        }

        let metadata = fs::symlink_metadata(&from).map_err(|e| copy_error(relative, e))?;
        if metadata.file_type().is_symlink() {
            copy_symlink(&from, &to).map_err(|e| copy_error(relative, e))?;
        } else {
            fs::copy(&from, &to).map_err(|e| copy_error(relative, e))?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    let target = fs::read_link(from)?;
    std::os::unix::fs::symlink(target, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::copy(from, to).map(|_| ())
}

fn copy_error(path: &Path, err: std::io::Error) -> BuildError {
    BuildError::SourceCopy {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}
