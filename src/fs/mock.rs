use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory build context; `None` content marks a directory
pub struct MockFileSystem {
    entries: RwLock<BTreeMap<PathBuf, Option<String>>>,
    root: PathBuf,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/mock"))
    }

    pub fn with_root(root: PathBuf) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(root.clone(), None);
        Self {
            entries: RwLock::new(entries),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = self.normalize_path(path.as_ref());
        let mut entries = self.lock_write();
        if let Some(parent) = path.parent() {
            Self::ensure_parents(&mut entries, parent);
        }
        entries.insert(path, Some(content.to_string()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = self.normalize_path(path.as_ref());
        let mut entries = self.lock_write();
        Self::ensure_parents(&mut entries, &path);
    }

    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn ensure_parents(entries: &mut BTreeMap<PathBuf, Option<String>>, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            entries.entry(current.clone()).or_insert(None);
        }
    }

    fn lock_read(&self) -> RwLockReadGuard<'_, BTreeMap<PathBuf, Option<String>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_write(&self) -> RwLockWriteGuard<'_, BTreeMap<PathBuf, Option<String>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.lock_read().contains_key(&self.normalize_path(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock_read().get(&self.normalize_path(path)), Some(None))
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock_read().get(&self.normalize_path(path)), Some(Some(_)))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let path = self.normalize_path(path);
        match self.lock_read().get(&path) {
            Some(Some(content)) => Ok(content.clone()),
            Some(None) => Err(anyhow!("Not a file: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.read_to_string(path).map(String::into_bytes)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let path = self.normalize_path(path);
        let entries = self.lock_read();

        if !matches!(entries.get(&path), Some(None)) {
            return Err(anyhow!("Directory not found: {:?}", path));
        }

        Ok(entries
            .keys()
            .filter(|p| p.parent() == Some(path.as_path()))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_file() {
        let fs = MockFileSystem::new();
        fs.add_file("main.py", "print('ok')");

        assert!(fs.exists(Path::new("/mock/main.py")));
        assert!(fs.is_file(Path::new("main.py")));
        assert!(fs.is_dir(Path::new("/mock")));
    }

    #[test]
    fn test_read_to_string() {
        let fs = MockFileSystem::new();
        fs.add_file("Pipfile", "[packages]\n");

        assert_eq!(fs.read_to_string(Path::new("Pipfile")).unwrap(), "[packages]\n");
        assert!(fs.read_to_string(Path::new("missing")).is_err());
        assert!(fs.read_to_string(Path::new("/mock")).is_err());
    }

    #[test]
    fn test_list_dir() {
        let fs = MockFileSystem::new();
        fs.add_file("pyproject.toml", "");
        fs.add_file("utils/pg_utils.py", "");
        fs.add_dir("data");

        let names = fs.list_dir(Path::new("/mock")).unwrap();
        assert_eq!(names, vec!["data", "pyproject.toml", "utils"]);
        assert!(fs.list_dir(Path::new("pyproject.toml")).is_err());
    }

    #[test]
    fn test_parent_directories_created() {
        let fs = MockFileSystem::with_root(PathBuf::from("/repo"));
        fs.add_file("a/b/c.py", "");

        assert!(fs.is_dir(Path::new("/repo/a")));
        assert!(fs.is_dir(Path::new("/repo/a/b")));
        assert!(fs.is_file(Path::new("/repo/a/b/c.py")));
    }
}
