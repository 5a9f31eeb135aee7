//! Shared Python manifest helpers: interpreter version, project name, fingerprint

use crate::config::{is_valid_python_version, DEFAULT_PYTHON_VERSION};
use crate::fs::FileSystem;
use anyhow::Result;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Interpreter version and where it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: String,
    pub source: String,
}

impl ResolvedVersion {
    fn new(version: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            source: source.into(),
        }
    }
}

/// Resolve the interpreter version for a build context
///
/// Order: explicit pin, `.python-version`, `runtime.txt`, `pyproject.toml`
/// (`requires-python` or `[tool.poetry.dependencies] python`), `Pipfile`
/// (`[requires] python_version`), then the built-in default.
pub fn resolve_python_version(
    fs: &dyn FileSystem,
    root: &Path,
    pinned: Option<&str>,
) -> Result<ResolvedVersion> {
    if let Some(version) = pinned {
        return Ok(ResolvedVersion::new(version, "config"));
    }

    if let Some(content) = fs.read_optional(&root.join(".python-version"))? {
        if let Some(v) = parse_version_file(&content) {
            return Ok(ResolvedVersion::new(v, ".python-version"));
        }
    }

    if let Some(content) = fs.read_optional(&root.join("runtime.txt"))? {
        if let Some(v) = parse_runtime_txt(&content) {
            return Ok(ResolvedVersion::new(v, "runtime.txt"));
        }
    }

    if let Some(content) = fs.read_optional(&root.join("pyproject.toml"))? {
        if let Some(v) = parse_pyproject_python(&content) {
            return Ok(ResolvedVersion::new(v, "pyproject.toml"));
        }
    }

    if let Some(content) = fs.read_optional(&root.join("Pipfile"))? {
        if let Some(v) = parse_pipfile_python(&content) {
            return Ok(ResolvedVersion::new(v, "Pipfile"));
        }
    }

    Ok(ResolvedVersion::new(DEFAULT_PYTHON_VERSION, "default"))
}

/// `.python-version` holds a bare version, possibly with a patch level
fn parse_version_file(content: &str) -> Option<String> {
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))?;
    minor_version(line)
}

/// `runtime.txt` uses the `python-3.11.4` form
fn parse_runtime_txt(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let version = trimmed.strip_prefix("python-").unwrap_or(trimmed);
    minor_version(version)
}

fn parse_pyproject_python(content: &str) -> Option<String> {
    let value: toml::Value = toml::from_str(content).ok()?;

    let requires = value
        .get("project")
        .and_then(|p| p.get("requires-python"))
        .and_then(|v| v.as_str());
    let poetry = value
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.get("python"))
        .and_then(|v| v.as_str());

    requires.or(poetry).and_then(lowest_bound)
}

fn parse_pipfile_python(content: &str) -> Option<String> {
    let value: toml::Value = toml::from_str(content).ok()?;
    let requires = value.get("requires")?;
    requires
        .get("python_version")
        .or_else(|| requires.get("python_full_version"))
        .and_then(|v| v.as_str())
        .and_then(minor_version)
}

/// Lowest `3.N` admitted by a constraint such as `>=3.10,<4` or `^3.11`
///
/// Upper bounds and exclusions (`<3.13`, `!=3.11.*`) never pin the version,
/// wherever they appear among the clauses.
fn lowest_bound(constraint: &str) -> Option<String> {
    let re = Regex::new(r"3\.(\d{1,2})").ok()?;
    constraint
        .split(',')
        .map(str::trim)
        .filter(|clause| !clause.starts_with('<') && !clause.starts_with("!="))
        .filter_map(|clause| re.captures(clause)?[1].parse::<u32>().ok())
        .min()
        .map(|minor| format!("3.{}", minor))
}

fn minor_version(raw: &str) -> Option<String> {
    let re = Regex::new(r"^(3\.\d{1,2})(?:\.\d+)?").ok()?;
    let caps = re.captures(raw.trim())?;
    let version = caps[1].to_string();
    is_valid_python_version(&version).then_some(version)
}

/// `[project] name` or `[tool.poetry] name` from a pyproject manifest
pub fn project_name(pyproject: &str) -> Option<String> {
    let value: toml::Value = toml::from_str(pyproject).ok()?;
    value
        .get("project")
        .and_then(|p| p.get("name"))
        .or_else(|| {
            value
                .get("tool")
                .and_then(|t| t.get("poetry"))
                .and_then(|p| p.get("name"))
        })
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// sha256 over manifest and lock file names and contents
///
/// Identical inputs yield the identical digest, which is what makes
/// provisioning idempotent.
pub fn fingerprint(manifest: (&str, &[u8]), lockfile: Option<(&str, &[u8])>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(manifest.0.as_bytes());
    hasher.update([0u8]);
    hasher.update(manifest.1);
    if let Some((name, content)) = lockfile {
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(content);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use yare::parameterized;

    #[test]
    fn test_pinned_version_wins() {
        let fs = MockFileSystem::new();
        fs.add_file("/mock/.python-version", "3.10\n");
        let resolved = resolve_python_version(&fs, Path::new("/mock"), Some("3.11")).unwrap();
        assert_eq!(resolved, ResolvedVersion::new("3.11", "config"));
    }

    #[test]
    fn test_default_without_hints() {
        let fs = MockFileSystem::new();
        fs.add_file("/mock/requirements.txt", "requests\n");
        let resolved = resolve_python_version(&fs, Path::new("/mock"), None).unwrap();
        assert_eq!(resolved, ResolvedVersion::new("3.12", "default"));
    }

    #[test]
    fn test_python_version_file_before_pyproject() {
        let fs = MockFileSystem::new();
        fs.add_file("/mock/.python-version", "3.10.13\n");
        fs.add_file(
            "/mock/pyproject.toml",
            "[project]\nname = \"x\"\nrequires-python = \">=3.11\"\n",
        );
        let resolved = resolve_python_version(&fs, Path::new("/mock"), None).unwrap();
        assert_eq!(resolved, ResolvedVersion::new("3.10", ".python-version"));
    }

    #[test]
    fn test_pipfile_requires() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "/mock/Pipfile",
            "[packages]\nrequests = \"*\"\n\n[requires]\npython_version = \"3.9\"\n",
        );
        let resolved = resolve_python_version(&fs, Path::new("/mock"), None).unwrap();
        assert_eq!(resolved, ResolvedVersion::new("3.9", "Pipfile"));
    }

    #[parameterized(
        requires_python = { "[project]\nrequires-python = \">=3.11,<4\"\n", Some("3.11") },
        poetry_caret = { "[tool.poetry.dependencies]\npython = \"^3.10\"\n", Some("3.10") },
        upper_bound_first = { "[project]\nrequires-python = \"<3.13,>=3.10\"\n", Some("3.10") },
        exclusion_first = { "[project]\nrequires-python = \"!=3.11.*, >=3.9\"\n", Some("3.9") },
        upper_bound_only = { "[project]\nrequires-python = \"<3.13\"\n", None },
        no_constraint = { "[project]\nname = \"x\"\n", None },
        not_toml = { "this is = = broken", None },
    )]
    fn test_parse_pyproject_python(content: &str, expected: Option<&str>) {
        assert_eq!(parse_pyproject_python(content).as_deref(), expected);
    }

    #[parameterized(
        plain = { "python-3.11.4", Some("3.11") },
        bare = { "3.12", Some("3.12") },
        python2 = { "python-2.7.18", None },
    )]
    fn test_parse_runtime_txt(content: &str, expected: Option<&str>) {
        assert_eq!(parse_runtime_txt(content).as_deref(), expected);
    }

    #[test]
    fn test_project_name() {
        assert_eq!(
            project_name("[project]\nname = \"jobs-scraper\"\n").as_deref(),
            Some("jobs-scraper")
        );
        assert_eq!(
            project_name("[tool.poetry]\nname = \"poetry-app\"\n").as_deref(),
            Some("poetry-app")
        );
        assert_eq!(project_name("[build-system]\n"), None);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint(("pyproject.toml", b"[project]"), Some(("uv.lock", b"v1")));
        let b = fingerprint(("pyproject.toml", b"[project]"), Some(("uv.lock", b"v1")));
        let c = fingerprint(("pyproject.toml", b"[project]"), Some(("uv.lock", b"v2")));
        let d = fingerprint(("pyproject.toml", b"[project]"), None);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
    }
}
