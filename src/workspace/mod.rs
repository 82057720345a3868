//! Isolated workspaces: independent working copies sharing one change history.

pub mod ownership;

pub use ownership::OwnershipDetector;

use crate::daemon::RepoRegistry;
use crate::errors::{Result, WeaveError};
use crate::focus::{FocusEngine, FocusStore};
use crate::jj::{Change, FileChange, Jj};
use crate::repo::{WeaveRepo, DEFAULT_WORKSPACE};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What a workspace's changes are measured against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteBaseline {
    /// Nothing pushed yet: everything since trunk would ship
    Trunk,
    /// The bookmark is on the remote: only the unpushed delta would ship
    Pushed { bookmark: String },
}

impl RemoteBaseline {
    pub fn revset(&self, jj: &Jj) -> String {
        match self {
            RemoteBaseline::Trunk => jj.trunk(),
            RemoteBaseline::Pushed { bookmark } => jj.remote_ref(bookmark),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceInfo {
    pub name: String,
    pub path: PathBuf,
    pub tip: String,
    pub focused: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceStatus {
    pub name: String,
    pub tip: Change,
    pub bookmark: Option<String>,
    pub baseline: RemoteBaseline,
    pub files: Vec<FileChange>,
}

/// Nearest bookmark between trunk and the workspace tip, if any
pub fn workspace_bookmark(jj: &Jj, workspace: &str) -> Result<Option<String>> {
    let revset = format!(
        "heads(({})..{} & bookmarks())",
        jj.trunk(),
        Jj::workspace_tip(workspace)
    );
    Ok(jj
        .log(&revset)?
        .into_iter()
        .find_map(|c| c.bookmarks.into_iter().next()))
}

/// `bookmark@remote` when the workspace's bookmark has been pushed and not yet landed, else trunk
pub fn remote_baseline(jj: &Jj, workspace: &str) -> Result<(Option<String>, RemoteBaseline)> {
    let Some(bookmark) = workspace_bookmark(jj, workspace)? else {
        return Ok((None, RemoteBaseline::Trunk));
    };

    let pushed = jj
        .bookmark(&bookmark)?
        .map(|b| b.is_pushed())
        .unwrap_or(false);
    if !pushed {
        return Ok((Some(bookmark), RemoteBaseline::Trunk));
    }

    let landed = format!("{} & ::{}", jj.remote_ref(&bookmark), jj.trunk());
    if !jj.log(&landed)?.is_empty() {
        debug!("Bookmark {} already landed on trunk", bookmark);
        return Ok((Some(bookmark), RemoteBaseline::Trunk));
    }

    Ok((
        Some(bookmark.clone()),
        RemoteBaseline::Pushed { bookmark },
    ))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == DEFAULT_WORKSPACE
        || name.starts_with('.')
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(WeaveError::invalid_input(format!(
            "Invalid workspace name '{name}': use letters, digits, '-', '_' or '.'"
        )));
    }
    Ok(())
}

pub struct WorkspaceManager<'a> {
    repo: &'a WeaveRepo,
}

impl<'a> WorkspaceManager<'a> {
    pub fn new(repo: &'a WeaveRepo) -> Self {
        Self { repo }
    }

    /// Every workspace the backend knows about, with its focus membership
    pub fn list(&self) -> Result<Vec<WorkspaceInfo>> {
        let focused = FocusStore::new(self.repo.state_dir())
            .get(self.repo.root(), |w| self.repo.workspace_exists(w))?;
        Ok(self
            .repo
            .root_jj()
            .workspace_list()?
            .into_iter()
            .map(|entry| WorkspaceInfo {
                path: self.repo.workspace_path(&entry.name),
                focused: focused.contains(&entry.name),
                name: entry.name,
                tip: entry.change_id,
            })
            .collect())
    }

    /// Names of agent workspaces present on disk (neither the main checkout nor the sentinel)
    pub fn agent_workspaces(&self) -> Result<Vec<String>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|w| w.name != DEFAULT_WORKSPACE && w.name != self.repo.unassigned())
            .filter(|w| self.repo.workspace_exists(&w.name))
            .map(|w| w.name)
            .collect())
    }

    fn is_known(&self, name: &str) -> Result<bool> {
        if self.repo.workspace_exists(name) {
            return Ok(true);
        }
        Ok(self
            .repo
            .root_jj()
            .workspace_list()?
            .iter()
            .any(|w| w.name == name))
    }

    /// Create a workspace rooted at trunk. Focusing it is the caller's job.
    pub fn add(&self, name: &str) -> Result<WorkspaceInfo> {
        validate_name(name)?;
        if self.is_known(name)? {
            return Err(WeaveError::WorkspaceExists(name.to_string()));
        }

        let path = self.repo.workspace_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let jj = self.repo.root_jj();
        jj.workspace_add(name, &path, &jj.trunk())?;
        info!("Created workspace {} at {}", name, path.display());

        self.link_editor_files(&path);
        self.register_for_daemon();

        Ok(WorkspaceInfo {
            name: name.to_string(),
            path,
            tip: Jj::workspace_tip(name),
            focused: false,
        })
    }

    /// Symlink editor/tooling entries from the main checkout into a new workspace
    fn link_editor_files(&self, workspace_path: &Path) {
        for entry in &self.repo.settings().workspace.editor_links {
            let source = self.repo.root().join(entry);
            let target = workspace_path.join(entry);
            if !source.exists() || target.exists() {
                continue;
            }
            if let Err(e) = symlink(&source, &target) {
                warn!("Could not link {} into workspace: {}", entry, e);
            }
        }
    }

    fn register_for_daemon(&self) {
        if let Err(e) = RepoRegistry::new(self.repo.state_dir()).register(self.repo.root()) {
            warn!("Could not register repository with the daemon: {}", e);
        }
    }

    /// Delete a workspace, unfocusing it first so the preview is rebuilt without it
    pub fn remove(&self, name: &str, force: bool) -> Result<()> {
        if name == DEFAULT_WORKSPACE || name == self.repo.unassigned() {
            return Err(WeaveError::invalid_input(format!(
                "Workspace '{name}' is managed by weave and cannot be removed"
            )));
        }
        if !self.is_known(name)? {
            return Err(WeaveError::WorkspaceNotFound(name.to_string()));
        }

        if !force && self.repo.workspace_exists(name) {
            let status = self.status(name)?;
            if !status.files.is_empty() {
                return Err(WeaveError::invalid_state(format!(
                    "Workspace '{name}' has {} unpushed file change(s); use --force to discard them",
                    status.files.len()
                )));
            }
        }

        let engine = FocusEngine::new(self.repo);
        if engine.focused()?.iter().any(|w| w == name) {
            info!("Unfocusing {} before removal", name);
            engine.focus_remove(&[name.to_string()])?;
        }

        self.repo.root_jj().workspace_forget(name)?;
        let path = self.repo.workspace_path(name);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        info!("Removed workspace {}", name);
        Ok(())
    }

    /// Diff of the workspace against what has already been pushed
    pub fn status(&self, name: &str) -> Result<WorkspaceStatus> {
        if !self.repo.workspace_exists(name) {
            return Err(WeaveError::WorkspaceNotFound(name.to_string()));
        }
        self.snapshot(name)?;

        let jj = self.repo.root_jj();
        let tip = jj.resolve_single(&Jj::workspace_tip(name))?;
        let (bookmark, baseline) = remote_baseline(jj, name)?;
        let files = jj.diff_summary(&baseline.revset(jj), &tip.commit_id)?;

        Ok(WorkspaceStatus {
            name: name.to_string(),
            tip,
            bookmark,
            baseline,
            files,
        })
    }

    /// Force-capture the workspace's on-disk edits
    pub fn snapshot(&self, name: &str) -> Result<()> {
        self.repo.workspace_jj(name).snapshot()
    }

    /// Create the sentinel workspace if missing. Returns whether it was created.
    pub fn ensure_unassigned(&self) -> Result<bool> {
        let name = self.repo.unassigned().to_string();
        if self.is_known(&name)? {
            return Ok(false);
        }
        self.add(&name)?;
        Ok(true)
    }
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, target)
    } else {
        std::os::windows::fs::symlink_file(source, target)
    }
}
