//! Dependency tool registry

use super::{DependencyTool, PipenvTool, PoetryTool, ToolKind, UvTool};
use crate::error::BuildError;
use crate::fs::FileSystem;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Manifest chosen for a build context and the tool that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDetection {
    pub tool: ToolKind,
    pub manifest: String,
    pub lockfile: Option<String>,
    pub priority: u8,
}

/// Registry of dependency tools
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn DependencyTool>>,
    manifest_index: HashMap<&'static str, Vec<usize>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            manifest_index: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UvTool));
        registry.register(Arc::new(PoetryTool));
        registry.register(Arc::new(PipenvTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn DependencyTool>) {
        let idx = self.tools.len();
        for pattern in tool.manifest_patterns() {
            self.manifest_index
                .entry(pattern.filename)
                .or_default()
                .push(idx);
        }
        self.tools.push(tool);
    }

    pub fn get(&self, kind: ToolKind) -> Option<&dyn DependencyTool> {
        self.tools
            .iter()
            .find(|t| t.kind() == kind)
            .map(|t| t.as_ref())
    }

    /// Check if `filename` is a manifest some tool understands
    pub fn is_manifest(&self, filename: &str) -> bool {
        self.manifest_index.contains_key(filename)
    }

    /// Pick the manifest and tool for the context at `root`
    ///
    /// Every manifest at the root is offered to every tool that lists it; the
    /// highest claim wins. Ties go to the tool registered first. A `forced`
    /// tool skips the contest and takes the first of its own manifests present.
    pub fn detect(
        &self,
        fs: &dyn FileSystem,
        root: &Path,
        forced: Option<ToolKind>,
    ) -> Result<ToolDetection, BuildError> {
        let siblings = fs
            .list_dir(root)
            .map_err(|e| BuildError::SourceCopy {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;

        let read = |name: &str| -> Result<Option<String>, BuildError> {
            fs.read_optional(&root.join(name))
                .map_err(|e| BuildError::SourceCopy {
                    path: root.join(name),
                    reason: e.to_string(),
                })
        };

        if let Some(kind) = forced {
            let tool = self
                .get(kind)
                .ok_or_else(|| BuildError::MissingManifest(root.to_path_buf()))?;
            let pattern = tool
                .manifest_patterns()
                .iter()
                .find(|p| siblings.iter().any(|s| s == p.filename))
                .ok_or_else(|| BuildError::MissingManifest(root.to_path_buf()))?;
            debug!(tool = %kind, manifest = pattern.filename, "Using forced dependency tool");
            return Ok(ToolDetection {
                tool: kind,
                manifest: pattern.filename.to_string(),
                lockfile: lockfile_of(tool, pattern.filename, &siblings),
                priority: pattern.priority,
            });
        }

        let mut best: Option<ToolDetection> = None;

        for name in &siblings {
            let Some(candidates) = self.manifest_index.get(name.as_str()) else {
                continue;
            };
            let content = read(name)?;

            for &idx in candidates {
                let tool = &self.tools[idx];
                let Some(priority) = tool.claim(name, content.as_deref(), &siblings) else {
                    continue;
                };
                debug!(tool = %tool.kind(), manifest = %name, priority, "Tool claims manifest");

                let better = match &best {
                    Some(current) => priority > current.priority,
                    None => true,
                };
                if better {
                    best = Some(ToolDetection {
                        tool: tool.kind(),
                        manifest: name.clone(),
                        lockfile: lockfile_of(tool.as_ref(), name, &siblings),
                        priority,
                    });
                }
            }
        }

        best.ok_or_else(|| BuildError::MissingManifest(root.to_path_buf()))
    }
}

/// Lock files only pin the manifest they belong to; `requirements.txt` has none
fn lockfile_of(tool: &dyn DependencyTool, manifest: &str, siblings: &[String]) -> Option<String> {
    if manifest == "requirements.txt" {
        return None;
    }
    tool.lockfile()
        .filter(|lock| siblings.iter().any(|s| s == lock))
        .map(str::to_string)
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    fn detect(files: &[(&str, &str)], forced: Option<ToolKind>) -> Result<ToolDetection, BuildError> {
        let fs = MockFileSystem::new();
        for (name, content) in files {
            fs.add_file(format!("/mock/{}", name), content);
        }
        ToolRegistry::with_defaults().detect(&fs, Path::new("/mock"), forced)
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = ToolRegistry::with_defaults();
        assert_eq!(registry.tools.len(), 3);
        assert!(registry.get(ToolKind::Poetry).is_some());
        assert!(registry.is_manifest("Pipfile"));
        assert!(!registry.is_manifest("setup.py"));
    }

    #[test]
    fn test_uv_lock_wins() {
        let result = detect(
            &[
                ("pyproject.toml", "[project]\nname = \"app\"\n"),
                ("uv.lock", "version = 1\n"),
                ("requirements.txt", "requests\n"),
            ],
            None,
        )
        .unwrap();
        assert_eq!(result.tool, ToolKind::Uv);
        assert_eq!(result.manifest, "pyproject.toml");
        assert_eq!(result.lockfile.as_deref(), Some("uv.lock"));
    }

    #[test]
    fn test_poetry_project() {
        let result = detect(
            &[("pyproject.toml", "[tool.poetry]\nname = \"app\"\n"), ("poetry.lock", "")],
            None,
        )
        .unwrap();
        assert_eq!(result.tool, ToolKind::Poetry);
        assert_eq!(result.lockfile.as_deref(), Some("poetry.lock"));
    }

    #[test]
    fn test_pipfile_beats_requirements() {
        let result = detect(&[("Pipfile", "[packages]\n"), ("requirements.txt", "flask\n")], None)
            .unwrap();
        assert_eq!(result.tool, ToolKind::Pipenv);
        assert_eq!(result.lockfile, None);
    }

    #[test]
    fn test_requirements_only() {
        let result = detect(&[("requirements.txt", "flask\n"), ("main.py", "")], None).unwrap();
        assert_eq!(result.tool, ToolKind::Uv);
        assert_eq!(result.manifest, "requirements.txt");
        assert_eq!(result.priority, 5);
    }

    #[test]
    fn test_missing_manifest() {
        let err = detect(&[("main.py", "print('hi')\n")], None).unwrap_err();
        assert!(matches!(err, BuildError::MissingManifest(_)));
    }

    #[test]
    fn test_forced_tool() {
        let result = detect(
            &[("pyproject.toml", "[tool.poetry]\nname = \"app\"\n")],
            Some(ToolKind::Uv),
        )
        .unwrap();
        assert_eq!(result.tool, ToolKind::Uv);
        assert_eq!(result.manifest, "pyproject.toml");

        let err = detect(&[("requirements.txt", "")], Some(ToolKind::Pipenv)).unwrap_err();
        assert!(matches!(err, BuildError::MissingManifest(_)));
    }
}
