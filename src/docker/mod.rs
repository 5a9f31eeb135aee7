//! Docker daemon access: build the planned image and launch containers from it

pub mod build_log;

pub use build_log::{parse_step, BuildLogTracker, StepHeader};

use crate::context::{context_archive, DOCKERFILE_NAME};
use crate::error::BuildError;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::recipe::{BuildRecipe, Dockerfile, Stage};
use anyhow::{Context, Result};
use bollard::container::{
    Config, LogOutput, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::Docker;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Exit status reported when the run is interrupted with Ctrl-C
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub tag: String,
    pub no_cache: bool,
    pub pull: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// `KEY=VALUE` pairs passed to the container
    pub env: Vec<String>,
    /// Keep the container after it exits
    pub keep: bool,
}

/// Result of a successful build
#[derive(Debug, Clone, Serialize)]
pub struct BuiltImage {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub steps: usize,
    pub duration_ms: u128,
}

/// Daemon reachability report
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct DockerClient {
    docker: Docker,
    progress: Option<Arc<dyn ProgressHandler>>,
}

impl DockerClient {
    /// Connect via `DOCKER_HOST` or the local socket
    pub fn connect() -> Result<Self, BuildError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| BuildError::DaemonUnavailable(e.to_string()))?;
        Ok(Self {
            docker,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress {
            handler.on_progress(&event);
        }
    }

    pub async fn health(&self) -> DaemonHealth {
        if let Err(e) = self.docker.ping().await {
            debug!("Docker ping failed: {}", e);
            return DaemonHealth {
                reachable: false,
                version: None,
                api_version: None,
                os: None,
                arch: None,
                error: Some(e.to_string()),
            };
        }

        match self.docker.version().await {
            Ok(v) => DaemonHealth {
                reachable: true,
                version: v.version,
                api_version: v.api_version,
                os: v.os,
                arch: v.arch,
                error: None,
            },
            Err(e) => DaemonHealth {
                reachable: true,
                version: None,
                api_version: None,
                os: None,
                arch: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Build `recipe` and tag the result
    ///
    /// Stops at the first failing instruction; the error names the stage.
    pub async fn build(
        &self,
        recipe: &BuildRecipe,
        options: &BuildOptions,
    ) -> Result<BuiltImage, BuildError> {
        let start = Instant::now();
        self.docker
            .ping()
            .await
            .map_err(|e| BuildError::DaemonUnavailable(e.to_string()))?;

        let dockerfile = Dockerfile::from_recipe(recipe);
        let archive = context_archive(&recipe.source, &dockerfile.render())?;
        let total = dockerfile.instructions().len();

        info!(
            tag = %options.tag,
            image = %recipe.base.image,
            steps = total,
            context_bytes = archive.len(),
            "Building image"
        );
        self.emit(ProgressEvent::Started {
            context: recipe.source.root.display().to_string(),
        });

        let build_options = BuildImageOptions {
            dockerfile: DOCKERFILE_NAME.to_string(),
            t: options.tag.clone(),
            rm: true,
            forcerm: true,
            pull: options.pull,
            nocache: options.no_cache,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(build_options, None, Some(Bytes::from(archive)));

        let mut tracker = BuildLogTracker::new(recipe, &dockerfile);
        let mut step_started: Option<(usize, Instant)> = None;
        let mut image_id = None;

        while let Some(item) = stream.next().await {
            let info = match item {
                Ok(info) => info,
                Err(e) => {
                    let err = tracker.fail(&e.to_string());
                    self.fail_step(&tracker, step_started, &err);
                    return Err(err);
                }
            };

            if let Some(chunk) = info.stream.as_deref() {
                trace!("{}", chunk.trim_end());
                if let Some(header) = tracker.observe(chunk) {
                    if let Some((index, started)) = step_started.take() {
                        self.emit(ProgressEvent::StepComplete {
                            stage: dockerfile
                                .stage_of_step(index)
                                .unwrap_or(Stage::BaseImage),
                            index,
                            duration: started.elapsed(),
                            success: true,
                        });
                    }
                    self.emit(ProgressEvent::StepStarted {
                        stage: tracker.current_stage(),
                        index: header.index,
                        total: header.total,
                        description: header.instruction.clone(),
                    });
                    step_started = Some((header.index, Instant::now()));
                }
            }

            let message = info
                .error
                .clone()
                .or_else(|| info.error_detail.as_ref().and_then(|d| d.message.clone()));
            if let Some(message) = message {
                let err = tracker.fail(&message);
                self.fail_step(&tracker, step_started, &err);
                return Err(err);
            }

            if let Some(id) = info.aux.and_then(|aux| aux.id) {
                image_id = Some(id);
            }
        }

        if let Some((index, started)) = step_started {
            self.emit(ProgressEvent::StepComplete {
                stage: dockerfile.stage_of_step(index).unwrap_or(Stage::EntryPoint),
                index,
                duration: started.elapsed(),
                success: true,
            });
        }

        if image_id.is_none() {
            image_id = self
                .docker
                .inspect_image(&options.tag)
                .await
                .ok()
                .and_then(|i| i.id);
        }

        let duration = start.elapsed();
        self.emit(ProgressEvent::Completed {
            total_time: duration,
        });
        info!(tag = %options.tag, duration_ms = duration.as_millis(), "Image built");

        Ok(BuiltImage {
            tag: options.tag.clone(),
            id: image_id,
            steps: total,
            duration_ms: duration.as_millis(),
        })
    }

    fn fail_step(&self, tracker: &BuildLogTracker<'_>, step: Option<(usize, Instant)>, err: &BuildError) {
        if let Some((index, started)) = step {
            self.emit(ProgressEvent::StepComplete {
                stage: tracker.current_stage(),
                index,
                duration: started.elapsed(),
                success: false,
            });
        }
        self.emit(ProgressEvent::Failed {
            stage: err.stage(),
            error: err.to_string(),
        });
    }

    /// Start a container from `image` with its baked-in command and wait for it
    ///
    /// Output is relayed to this process's stdout and stderr. Returns the
    /// container's exit code unchanged.
    pub async fn run(&self, image: &str, options: &RunOptions) -> Result<i32> {
        self.docker
            .ping()
            .await
            .map_err(|e| BuildError::DaemonUnavailable(e.to_string()))?;

        let config = Config {
            image: Some(image.to_string()),
            env: (!options.env.is_empty()).then(|| options.env.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container::<String, String>(None, config)
            .await
            .with_context(|| format!("Failed to create container from {}", image))?;
        let id = container.id;
        for warning in &container.warnings {
            warn!("{}", warning);
        }
        debug!(container = %id, "Created container");

        let outcome = self.run_to_completion(&id).await;

        if !options.keep {
            if let Err(e) = self
                .docker
                .remove_container(
                    &id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
            {
                warn!(container = %id, "Failed to remove container: {}", e);
            }
        } else {
            info!(container = %id, "Keeping container");
        }

        outcome
    }

    async fn run_to_completion(&self, id: &str) -> Result<i32> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start container")?;

        let session = async { tokio::join!(self.relay_logs(id), self.wait_exit_code(id)) };

        let code = tokio::select! {
            (relayed, code) = session => {
                if let Err(e) = relayed {
                    debug!("Log relay ended early: {}", e);
                }
                code?
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(container = %id, "Interrupted, stopping container");
                if let Err(e) = self.kill(id).await {
                    warn!(container = %id, "{:#}", e);
                }
                return Ok(INTERRUPTED_EXIT_CODE);
            }
        };

        info!(container = %id, exit_code = code, "Container exited");
        Ok(code)
    }

    async fn kill(&self, id: &str) -> Result<()> {
        self.docker
            .kill_container::<String>(id, None)
            .await
            .with_context(|| format!("Failed to kill container {}", id))
    }

    async fn relay_logs(&self, id: &str) -> Result<()> {
        let mut logs = self.docker.logs(
            id,
            Some(LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        while let Some(item) = logs.next().await {
            match item.context("Failed to read container output")? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    let mut out = std::io::stdout().lock();
                    out.write_all(&message)?;
                    out.flush()?;
                }
                LogOutput::StdErr { message } => {
                    let mut err = std::io::stderr().lock();
                    err.write_all(&message)?;
                    err.flush()?;
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(())
    }

    async fn wait_exit_code(&self, id: &str) -> Result<i32> {
        let mut wait = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);

        match wait.next().await {
            Some(Ok(response)) => Ok(exit_code(response.status_code)),
            // Non-zero exits surface as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                Ok(exit_code(code))
            }
            Some(Err(e)) => Err(e).context("Failed to wait for container"),
            None => anyhow::bail!("Container wait stream ended without a status"),
        }
    }
}

fn exit_code(status: i64) -> i32 {
    i32::try_from(status).unwrap_or(1)
}
