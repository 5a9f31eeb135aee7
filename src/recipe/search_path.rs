//! Executable search path handling
//!
//! The search path is mutated exactly once per build: the environment's `bin`
//! directory goes in front, and the previous value is kept verbatim behind it.

use anyhow::{Context, Result};
use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// PATH of the official python images before any mutation
const IMAGE_DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPath {
    entries: Vec<PathBuf>,
}

impl SearchPath {
    /// Empty segments are kept so the value re-joins unchanged; an empty
    /// segment names the working directory during lookup.
    pub fn parse(value: impl AsRef<OsStr>) -> Self {
        let value = value.as_ref();
        if value.is_empty() {
            return Self::default();
        }
        Self {
            entries: env::split_paths(value).collect(),
        }
    }

    /// The current process's `PATH`
    pub fn from_env() -> Self {
        env::var_os("PATH").map(Self::parse).unwrap_or_default()
    }

    pub fn image_default() -> Self {
        Self::parse(IMAGE_DEFAULT_PATH)
    }

    /// Put `dir` ahead of every existing entry
    pub fn prepend(mut self, dir: impl Into<PathBuf>) -> Self {
        self.entries.insert(0, dir.into());
        self
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn to_env_value(&self) -> Result<OsString> {
        env::join_paths(&self.entries).context("Search path entry contains a separator")
    }

    /// First entry holding an executable called `program`
    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        self.entries
            .iter()
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }

    /// Value for a Dockerfile `ENV PATH=` line, expanding the prior PATH at build time
    pub fn dockerfile_value(prefix: &Path) -> String {
        format!("{}:$PATH", prefix.display())
    }
}

impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .entries
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        f.write_str(&joined)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
