//! Backend command runner: every interaction with `jj` goes through here.

pub mod backend;
pub mod status;
pub mod template;

pub use backend::{Jj, RebaseMode};
pub use status::WorkingCopyStatus;
pub use template::{Bookmark, BookmarkTarget, Change, FileChange, FileStatus, WorkspaceEntry};

use crate::errors::{Result, WeaveError};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Captured output of a successful backend invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout<S: Into<String>>(stdout: S) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Runs one backend subprocess. Failures are returned, never panicked on,
/// and keep the backend's stderr intact.
pub trait CommandRunner: Send + Sync {
    fn run(&self, args: &[String], cwd: &Path) -> Result<CommandOutput>;
}

/// Spawns the real `jj` binary
#[derive(Debug, Clone)]
pub struct JjRunner {
    binary: PathBuf,
}

impl JjRunner {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// True when the binary can be executed at all
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for JjRunner {
    fn default() -> Self {
        Self::new("jj")
    }
}

impl CommandRunner for JjRunner {
    fn run(&self, args: &[String], cwd: &Path) -> Result<CommandOutput> {
        let cmdline = format!("jj {}", args.join(" "));
        debug!("Running `{}` in {}", cmdline, cwd.display());

        let output = Command::new(&self.binary)
            .args(["--no-pager", "--color=never"])
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| WeaveError::command_failed(&cmdline, format!("failed to spawn: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            debug!("`{}` failed: {}", cmdline, stderr.trim());
            Err(WeaveError::command_failed(cmdline, stderr.trim().to_string()))
        }
    }
}
