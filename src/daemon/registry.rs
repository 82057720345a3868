use crate::errors::Result;
use crate::utils::{atomic_file, file_locking};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Repositories whose workspaces the daemon keeps snapshotted (`repos.json`)
#[derive(Debug, Clone)]
pub struct RepoRegistry {
    file: PathBuf,
}

impl RepoRegistry {
    pub const FILE_NAME: &'static str = "repos.json";

    pub fn new(state_dir: &Path) -> Self {
        Self {
            file: state_dir.join(Self::FILE_NAME),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    fn read_all(&self) -> Result<Vec<PathBuf>> {
        match atomic_file::read_json::<Vec<PathBuf>>(&self.file) {
            Ok(repos) => Ok(repos.unwrap_or_default()),
            Err(e) => {
                warn!("Ignoring unreadable repository registry {:?}: {}", self.file, e);
                Ok(Vec::new())
            }
        }
    }

    fn modify<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<PathBuf>) -> bool,
    {
        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        file_locking::with_file_lock(&self.file, || {
            let mut repos = self.read_all()?;
            if !change(&mut repos) {
                return Ok(false);
            }
            atomic_file::write_json_unlocked(&self.file, &repos)?;
            Ok(true)
        })
    }

    /// Add `root`. Returns false when it was already registered.
    pub fn register(&self, root: &Path) -> Result<bool> {
        self.modify(|repos| {
            if repos.iter().any(|r| r == root) {
                return false;
            }
            repos.push(root.to_path_buf());
            true
        })
    }

    pub fn unregister(&self, root: &Path) -> Result<bool> {
        self.modify(|repos| {
            let before = repos.len();
            repos.retain(|r| r != root);
            repos.len() != before
        })
    }

    pub fn list(&self) -> Result<Vec<PathBuf>> {
        self.read_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_register_dedupes() {
        let tmp = TempDir::new().unwrap();
        let registry = RepoRegistry::new(tmp.path());

        assert!(registry.register(Path::new("/work/one")).unwrap());
        assert!(!registry.register(Path::new("/work/one")).unwrap());
        assert!(registry.register(Path::new("/work/two")).unwrap());

        assert_eq!(
            registry.list().unwrap(),
            vec![PathBuf::from("/work/one"), PathBuf::from("/work/two")]
        );
    }

    #[test]
    fn test_unregister() {
        let tmp = TempDir::new().unwrap();
        let registry = RepoRegistry::new(tmp.path());
        registry.register(Path::new("/work/one")).unwrap();

        assert!(registry.unregister(Path::new("/work/one")).unwrap());
        assert!(!registry.unregister(Path::new("/work/one")).unwrap());
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_registry_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let registry = RepoRegistry::new(tmp.path());
        std::fs::write(registry.file(), "{not json").unwrap();
        assert!(registry.list().unwrap().is_empty());
        assert!(registry.register(Path::new("/work/one")).unwrap());
    }
}
