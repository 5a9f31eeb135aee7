//! Build context scanning
//!
//! Produces the [`SourceSet`] copied into the working directory. A root
//! `.dockerignore` is honoured with gitignore matching, which covers the
//! patterns real projects use; `.gitignore` files are not consulted because
//! the daemon does not consult them either.

pub mod archive;

pub use archive::{context_archive, DOCKERFILE_NAME};

use crate::error::BuildError;
use crate::recipe::SourceSet;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const DOCKERIGNORE: &str = ".dockerignore";

pub struct ContextScanner {
    root: PathBuf,
}

impl ContextScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the context and collect every file that will be copied
    ///
    /// Fails with [`BuildError::ContextMissing`] when the root is not a
    /// directory and with [`BuildError::SourceCopy`] on the first entry that
    /// cannot be read.
    pub fn scan(&self) -> Result<SourceSet, BuildError> {
        if !self.root.is_dir() {
            return Err(BuildError::ContextMissing(self.root.clone()));
        }

        let matcher = self.dockerignore()?;
        let ignored = matcher.clone();

        let root = self.root.clone();
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                let Some(matcher) = ignored.as_ref() else {
                    return true;
                };
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    return true;
                };
                if relative.as_os_str().is_empty() {
                    return true;
                }
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !matcher.matched(relative, is_dir).is_ignore()
            })
            .build();

        let mut files = Vec::new();
        let mut total_bytes = 0u64;

        for entry in walker {
            let entry = entry.map_err(|e| BuildError::SourceCopy {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;
            let path = entry.path();
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                continue;
            }

            let relative = path
                .strip_prefix(&self.root)
                .map_err(|e| BuildError::SourceCopy {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
                .to_path_buf();

            if file_type.is_file() {
                File::open(path).map_err(|e| BuildError::SourceCopy {
                    path: relative.clone(),
                    reason: e.to_string(),
                })?;
                let metadata = entry.metadata().map_err(|e| BuildError::SourceCopy {
                    path: relative.clone(),
                    reason: e.to_string(),
                })?;
                total_bytes += metadata.len();
            }

            trace!("Context entry: {}", relative.display());
            files.push(relative);
        }

        files.sort();
        debug!(
            "Scanned {} files ({} bytes) in {}",
            files.len(),
            total_bytes,
            self.root.display()
        );

        Ok(SourceSet {
            root: self.root.clone(),
            files,
            total_bytes,
            dockerignore: matcher.is_some(),
        })
    }

    fn dockerignore(&self) -> Result<Option<Gitignore>, BuildError> {
        let path = self.root.join(DOCKERIGNORE);
        if !path.is_file() {
            return Ok(None);
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        if let Some(err) = builder.add(&path) {
            warn!("Partially parsed {}: {}", DOCKERIGNORE, err);
        }
        let matcher = builder.build().map_err(|e| BuildError::SourceCopy {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        debug!("Loaded {} ({} patterns)", DOCKERIGNORE, matcher.num_ignores());
        Ok(Some(matcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn context(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_scan_collects_sorted_files() {
        let files = [
            ("main.py", "print('ok')\n"),
            ("pyproject.toml", "[project]\nname = \"x\"\n"),
            ("pkg/util.py", "X = 1\n"),
            (".env.example", "A=1\n"),
        ];
        let dir = context(&files);

        let source = ContextScanner::new(dir.path()).scan().unwrap();
        assert_eq!(
            source.files,
            vec![
                PathBuf::from(".env.example"),
                PathBuf::from("main.py"),
                PathBuf::from("pkg/util.py"),
                PathBuf::from("pyproject.toml"),
            ]
        );
        assert!(!source.dockerignore);
        let expected: usize = files.iter().map(|(_, c)| c.len()).sum();
        assert_eq!(source.total_bytes, expected as u64);
    }

    #[test]
    fn test_dockerignore_is_applied() {
        let dir = context(&[
            ("main.py", ""),
            ("requirements.txt", ""),
            (".dockerignore", "# local state\n.venv\n*.log\ndata/\n"),
            (".venv/bin/python", ""),
            ("debug.log", ""),
            ("data/big.csv", ""),
        ]);

        let source = ContextScanner::new(dir.path()).scan().unwrap();
        assert!(source.dockerignore);
        assert!(source.contains(Path::new("main.py")));
        assert!(source.contains(Path::new(".dockerignore")));
        assert!(!source.contains(Path::new(".venv/bin/python")));
        assert!(!source.contains(Path::new("debug.log")));
        assert!(!source.contains(Path::new("data/big.csv")));
    }

    #[test]
    fn test_gitignore_not_consulted() {
        let dir = context(&[("main.py", ""), (".gitignore", "main.py\n")]);
        let source = ContextScanner::new(dir.path()).scan().unwrap();
        assert!(source.contains(Path::new("main.py")));
    }

    #[test]
    fn test_missing_context() {
        let dir = TempDir::new().unwrap();
        let err = ContextScanner::new(dir.path().join("absent")).scan().unwrap_err();
        assert!(matches!(err, BuildError::ContextMissing(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_fails_copy() {
        use std::os::unix::fs::PermissionsExt;

        let dir = context(&[("main.py", ""), ("secret.txt", "x")]);
        let secret = dir.path().join("secret.txt");
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores permission bits
        if File::open(&secret).is_ok() {
            return;
        }

        let err = ContextScanner::new(dir.path()).scan().unwrap_err();
        assert!(matches!(err, BuildError::SourceCopy { .. }));
    }
}
