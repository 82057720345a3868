use crate::errors::Result;
use crate::utils::{atomic_file, file_locking};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One repository's focused workspaces as stored in `focus.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusEntry {
    pub path: String,
    pub workspaces: Vec<String>,
}

/// Machine-wide record of which workspaces are composed into each repository's preview.
///
/// Shared between interactive commands and the daemon. Every read-modify-write
/// happens under a lock file and lands with an atomic rename. Entries are never
/// trusted as stored: readers pass an existence check and stale names are dropped.
#[derive(Debug, Clone)]
pub struct FocusStore {
    file: PathBuf,
}

impl FocusStore {
    pub const FILE_NAME: &'static str = "focus.json";

    pub fn new(state_dir: &Path) -> Self {
        Self {
            file: state_dir.join(Self::FILE_NAME),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    fn key(repo: &Path) -> String {
        repo.to_string_lossy().to_string()
    }

    fn read_all(&self) -> Result<Vec<FocusEntry>> {
        match atomic_file::read_json::<Vec<FocusEntry>>(&self.file) {
            Ok(entries) => Ok(entries.unwrap_or_default()),
            Err(e) => {
                warn!("Ignoring unreadable focus state {:?}: {}", self.file, e);
                Ok(Vec::new())
            }
        }
    }

    /// Focused workspaces of `repo` that still pass `exists`, in stored order
    pub fn get<F>(&self, repo: &Path, exists: F) -> Result<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let key = Self::key(repo);
        let entries = self.read_all()?;
        let Some(entry) = entries.into_iter().find(|e| e.path == key) else {
            return Ok(Vec::new());
        };

        let (live, stale): (Vec<String>, Vec<String>) =
            entry.workspaces.into_iter().partition(|w| exists(w));
        if !stale.is_empty() {
            debug!("Dropping stale focused workspaces: {}", stale.join(", "));
        }
        Ok(live)
    }

    /// Replace the focused set of `repo` (an empty set unregisters it)
    pub fn set(&self, repo: &Path, workspaces: &[String]) -> Result<()> {
        let key = Self::key(repo);
        file_locking::with_file_lock(&self.file, || {
            let mut entries = self.read_all()?;
            entries.retain(|e| e.path != key);
            if !workspaces.is_empty() {
                entries.push(FocusEntry {
                    path: key.clone(),
                    workspaces: workspaces.to_vec(),
                });
            }
            if let Some(parent) = self.file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            atomic_file::write_json_unlocked(&self.file, &entries)
        })
    }

    pub fn remove(&self, repo: &Path) -> Result<()> {
        self.set(repo, &[])
    }
}
