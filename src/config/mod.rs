pub mod settings;

pub use settings::{
    DaemonConfig, GitHubConfig, JjConfig, MergeConfig, Settings, TrunkConfig, WorkspaceConfig,
};

use crate::errors::{Result, WeaveError};
use std::fs;
use std::path::{Path, PathBuf};

/// Where a command was invoked from, resolved against the shared backend store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    /// Root of the default workspace (the main checkout)
    pub root: PathBuf,
    /// Root of the workspace the command was run in
    pub workspace_root: PathBuf,
}

/// Machine-wide state directory (~/.weave/, overridable with WEAVE_HOME)
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("WEAVE_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home_dir =
        dirs::home_dir().ok_or_else(|| WeaveError::config("Could not find home directory"))?;
    Ok(home_dir.join(".weave"))
}

/// Per-repository metadata directory, kept inside `.jj` so it is never snapshotted
pub fn get_repo_meta_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(".jj").join("weave")
}

pub fn load_repo_settings(repo_root: &Path) -> Result<Settings> {
    let settings = Settings::load_from_file(&get_repo_meta_dir(repo_root).join("config.json"))?;
    settings.validate()?;
    Ok(settings)
}

/// Resolve the shared store of a workspace from its `.jj` directory.
/// Handles both the default workspace (`.jj/repo` is a directory) and secondary
/// workspaces (`.jj/repo` is a file holding the path of the shared store).
pub fn resolve_repo_store(workspace_root: &Path) -> Result<PathBuf> {
    let jj_dir = workspace_root.join(".jj");
    let repo_path = jj_dir.join("repo");
    if repo_path.is_dir() {
        Ok(repo_path)
    } else if repo_path.is_file() {
        let content = fs::read_to_string(&repo_path)
            .map_err(|e| WeaveError::config(format!("Failed to read .jj/repo file: {e}")))?;
        let target = content.trim();
        if target.is_empty() {
            return Err(WeaveError::config("Invalid .jj/repo file format"));
        }
        let resolved = if Path::new(target).is_absolute() {
            PathBuf::from(target)
        } else {
            jj_dir.join(target)
        };
        Ok(resolved)
    } else {
        Err(WeaveError::config(format!(
            "Not a jj workspace: {}",
            workspace_root.display()
        )))
    }
}

/// Walk up from `start` to the nearest jj workspace and locate the main checkout
pub fn find_repository(start: &Path) -> Result<RepoLocation> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".jj").is_dir() {
            let store = resolve_repo_store(dir)?;
            // <root>/.jj/repo -> <root>
            let root = store
                .parent()
                .and_then(Path::parent)
                .ok_or_else(|| WeaveError::config("Backend store has no parent workspace"))?;
            let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
            let workspace_root = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
            return Ok(RepoLocation {
                root,
                workspace_root,
            });
        }
        current = dir.parent();
    }
    Err(WeaveError::config(format!(
        "Not inside a jj repository: {}",
        start.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_workspace_is_its_own_root() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".jj").join("repo")).unwrap();
        let nested = tmp.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        let location = find_repository(&nested).unwrap();
        let expected = fs::canonicalize(tmp.path()).unwrap();
        assert_eq!(location.root, expected);
        assert_eq!(location.workspace_root, expected);
    }

    #[test]
    fn test_secondary_workspace_relative_pointer() {
        let tmp = TempDir::new().unwrap();
        let main = tmp.path().join("main");
        fs::create_dir_all(main.join(".jj").join("repo")).unwrap();
        let ws = tmp.path().join("main.workspaces").join("agent-a");
        fs::create_dir_all(ws.join(".jj")).unwrap();
        fs::write(ws.join(".jj").join("repo"), "../../../main/.jj/repo").unwrap();

        let location = find_repository(&ws).unwrap();
        assert_eq!(location.root, fs::canonicalize(&main).unwrap());
        assert_eq!(location.workspace_root, fs::canonicalize(&ws).unwrap());
    }

    #[test]
    fn test_secondary_workspace_absolute_pointer_with_newline() {
        let tmp = TempDir::new().unwrap();
        let main = tmp.path().join("main");
        fs::create_dir_all(main.join(".jj").join("repo")).unwrap();
        let ws = tmp.path().join("ws");
        fs::create_dir_all(ws.join(".jj")).unwrap();
        fs::write(
            ws.join(".jj").join("repo"),
            format!("{}\n", main.join(".jj").join("repo").display()),
        )
        .unwrap();

        let location = find_repository(&ws).unwrap();
        assert_eq!(location.root, fs::canonicalize(&main).unwrap());
    }

    #[test]
    fn test_not_a_repository() {
        let tmp = TempDir::new().unwrap();
        assert!(find_repository(tmp.path()).is_err());
    }

    #[test]
    fn test_empty_pointer_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".jj")).unwrap();
        fs::write(tmp.path().join(".jj").join("repo"), "  \n").unwrap();
        assert!(resolve_repo_store(tmp.path()).is_err());
    }
}
