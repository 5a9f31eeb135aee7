//! Child process execution
//!
//! [`CommandRunner`] is the seam between the host executor and the operating
//! system, so provisioning can be exercised without spawning real tools.

pub mod local;

pub use local::{LocalExecutor, LocalOptions, LocalOutcome, ProvisionStamp, STAMP_FILE};

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::debug;

/// One child process: program, arguments, working directory and extra variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Variables set on top of the inherited environment
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(argv: &[String], cwd: impl Into<PathBuf>) -> Self {
        let (program, args) = argv
            .split_first()
            .map_or((String::new(), Vec::new()), |(p, a)| (p.clone(), a.to_vec()));
        Self {
            program,
            args,
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = self
            .argv()
            .iter()
            .map(|w| crate::recipe::shell_quote(w))
            .collect();
        write!(f, "{}", words.join(" "))
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion with inherited stdio and return the exit code
    ///
    /// Errors only when the process cannot be spawned.
    async fn run(&self, invocation: &Invocation) -> Result<i32>;
}

/// Spawns real processes with `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, invocation: &Invocation) -> Result<i32> {
        debug!(cwd = %invocation.cwd.display(), "Running {}", invocation);

        let status = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .with_context(|| format!("Failed to spawn {}", invocation.program))?;

        Ok(exit_status_code(status))
    }
}

#[cfg(unix)]
fn exit_status_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
