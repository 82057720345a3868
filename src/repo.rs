use crate::config::{self, RepoLocation, Settings};
use crate::errors::Result;
use crate::jj::{CommandRunner, Jj, JjRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name the backend gives the main checkout's workspace
pub const DEFAULT_WORKSPACE: &str = "default";

/// Everything a command needs to know about the repository it runs against
#[derive(Debug, Clone)]
pub struct WeaveRepo {
    jj: Jj,
    root_jj: Jj,
    location: RepoLocation,
    settings: Settings,
    state_dir: PathBuf,
}

impl WeaveRepo {
    /// Discover the repository containing `start` and load its settings
    pub fn open(start: &Path) -> Result<Self> {
        let location = config::find_repository(start)?;
        let settings = config::load_repo_settings(&location.root)?;
        let runner = Arc::new(JjRunner::new(settings.jj.binary.clone()));
        Ok(Self::with_runner(
            location,
            settings,
            runner,
            config::get_config_dir()?,
        ))
    }

    pub fn with_runner(
        location: RepoLocation,
        settings: Settings,
        runner: Arc<dyn CommandRunner>,
        state_dir: PathBuf,
    ) -> Self {
        let jj = Jj::new(runner.clone(), location.workspace_root.clone(), &settings);
        let root_jj = jj.in_dir(&location.root);
        Self {
            jj,
            root_jj,
            location,
            settings,
            state_dir,
        }
    }

    /// Backend bound to the workspace the command was invoked from
    pub fn jj(&self) -> &Jj {
        &self.jj
    }

    /// Backend bound to the main checkout, where the preview lives
    pub fn root_jj(&self) -> &Jj {
        &self.root_jj
    }

    /// Backend bound to a named workspace's directory
    pub fn workspace_jj(&self, name: &str) -> Jj {
        self.jj.in_dir(&self.workspace_path(name))
    }

    pub fn root(&self) -> &Path {
        &self.location.root
    }

    pub fn workspace_root(&self) -> &Path {
        &self.location.workspace_root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Machine-wide state directory shared with the daemon
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn meta_dir(&self) -> PathBuf {
        config::get_repo_meta_dir(self.root())
    }

    pub fn unassigned(&self) -> &str {
        &self.settings.workspace.unassigned
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        match &self.settings.workspace.root {
            Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
            Some(dir) => self.root().join(dir),
            None => {
                let name = self
                    .root()
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "repo".to_string());
                let parent = self.root().parent().unwrap_or_else(|| self.root());
                parent.join(format!("{name}.workspaces"))
            }
        }
    }

    pub fn workspace_path(&self, name: &str) -> PathBuf {
        if name == DEFAULT_WORKSPACE {
            self.root().to_path_buf()
        } else {
            self.workspaces_dir().join(name)
        }
    }

    /// A workspace exists when its checkout is present on disk
    pub fn workspace_exists(&self, name: &str) -> bool {
        self.workspace_path(name).join(".jj").exists()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::jj::fake::FakeRunner;
    use std::fs;
    use tempfile::TempDir;

    /// A repository laid out on disk (main checkout plus workspace dirs) driven by a fake backend
    pub struct TestRepo {
        pub dir: TempDir,
        pub runner: Arc<FakeRunner>,
        pub repo: WeaveRepo,
    }

    impl TestRepo {
        pub fn new() -> Self {
            Self::with_settings(Settings::default())
        }

        pub fn with_settings(settings: Settings) -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().join("repo");
            fs::create_dir_all(root.join(".jj").join("repo")).unwrap();
            let state_dir = dir.path().join("state");
            fs::create_dir_all(&state_dir).unwrap();
            let runner = Arc::new(FakeRunner::new());
            let repo = WeaveRepo::with_runner(
                RepoLocation {
                    root: root.clone(),
                    workspace_root: root,
                },
                settings,
                runner.clone(),
                state_dir,
            );
            Self { dir, runner, repo }
        }

        /// Materialize a workspace checkout on disk
        pub fn create_workspace_dir(&self, name: &str) -> PathBuf {
            let path = self.repo.workspace_path(name);
            fs::create_dir_all(path.join(".jj")).unwrap();
            path
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TestRepo;
    use super::*;

    #[test]
    fn test_default_workspaces_dir_is_sibling() {
        let t = TestRepo::new();
        let expected = t.dir.path().join("repo.workspaces").join("agent-a");
        assert_eq!(t.repo.workspace_path("agent-a"), expected);
        assert_eq!(t.repo.workspace_path(DEFAULT_WORKSPACE), t.repo.root());
    }

    #[test]
    fn test_relative_workspaces_root() {
        let mut settings = Settings::default();
        settings.workspace.root = Some("../agents".to_string());
        let t = TestRepo::with_settings(settings);
        assert_eq!(
            t.repo.workspaces_dir(),
            t.repo.root().join("../agents")
        );
    }

    #[test]
    fn test_workspace_exists_checks_disk() {
        let t = TestRepo::new();
        assert!(!t.repo.workspace_exists("agent-a"));
        t.create_workspace_dir("agent-a");
        assert!(t.repo.workspace_exists("agent-a"));
    }

    #[test]
    fn test_workspace_jj_runs_in_the_workspace_checkout() {
        let t = TestRepo::new();
        let path = t.create_workspace_dir("agent-a");
        t.repo.workspace_jj("agent-a").run(&["status"]).unwrap();
        t.repo.root_jj().run(&["status"]).unwrap();

        let cwds: Vec<PathBuf> = t
            .runner
            .calls_with_cwd()
            .into_iter()
            .map(|(_, cwd)| cwd)
            .collect();
        assert_eq!(cwds, vec![path, t.repo.root().to_path_buf()]);
    }
}
