//! FileSystem trait definition

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Abstraction over the read-only file operations the planner performs on a
/// build context, so manifest handling can be tested without touching disk
pub trait FileSystem: Send + Sync {
    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Check if path is a regular file
    fn is_file(&self, path: &Path) -> bool;

    /// Read file contents as string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Read raw file contents
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Names of the entries directly under `path`, sorted
    fn list_dir(&self, path: &Path) -> Result<Vec<String>>;

    /// Read a file only if it exists, treating absence as `None`
    fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        if self.is_file(path) {
            self.read_to_string(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Join paths
    fn join(&self, base: &Path, path: &str) -> PathBuf {
        base.join(path)
    }
}
