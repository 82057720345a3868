use serde::Serialize;
use std::fmt;

/// A file touched by more than one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOwnership {
    pub path: String,
    pub workspaces: Vec<String>,
}

/// Stable error codes shared with callers that dispatch on the failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    WorkspaceNotFound,
    WorkspaceExists,
    InvalidState,
    InvalidRevision,
    AmbiguousRevision,
    Conflict,
    CommandFailed,
    DaemonRunning,
    DaemonNotRunning,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::WorkspaceNotFound => "WORKSPACE_NOT_FOUND",
            ErrorKind::WorkspaceExists => "WORKSPACE_EXISTS",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::InvalidRevision => "INVALID_REVISION",
            ErrorKind::AmbiguousRevision => "AMBIGUOUS_REVISION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::CommandFailed => "COMMAND_FAILED",
            ErrorKind::DaemonRunning => "DAEMON_RUNNING",
            ErrorKind::DaemonNotRunning => "DAEMON_NOT_RUNNING",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weave Error Types
#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    /// Malformed user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Something the caller referenced does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Workspace '{0}' not found")]
    WorkspaceNotFound(String),

    #[error("Workspace '{0}' already exists")]
    WorkspaceExists(String),

    /// The repository is not in a state that allows the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Revision '{0}' does not resolve to any change")]
    InvalidRevision(String),

    /// A revision resolved to several changes
    #[error("Revision '{revision}' is ambiguous: {}", candidates.join(", "))]
    AmbiguousRevision {
        revision: String,
        candidates: Vec<String>,
    },

    /// Files claimed by more than one workspace
    #[error("{} file(s) are modified by more than one workspace: {}", files.len(), describe_ownership(files))]
    Conflict { files: Vec<FileOwnership> },

    /// A backend invocation exited unsuccessfully
    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Daemon is already running (pid {0})")]
    DaemonRunning(u32),

    #[error("Daemon is not running")]
    DaemonNotRunning,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The hosted-PR service rejected a request
    #[error("Pull request service error: {0}")]
    Provider(String),
}

fn describe_ownership(files: &[FileOwnership]) -> String {
    files
        .iter()
        .map(|f| format!("{} ({})", f.path, f.workspaces.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

impl WeaveError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        WeaveError::InvalidInput(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        WeaveError::NotFound(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        WeaveError::InvalidState(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        WeaveError::Config(msg.into())
    }

    pub fn provider<S: Into<String>>(msg: S) -> Self {
        WeaveError::Provider(msg.into())
    }

    pub fn command_failed<S: Into<String>, T: Into<String>>(command: S, stderr: T) -> Self {
        WeaveError::CommandFailed {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WeaveError::InvalidInput(_) => ErrorKind::InvalidInput,
            WeaveError::NotFound(_) => ErrorKind::NotFound,
            WeaveError::WorkspaceNotFound(_) => ErrorKind::WorkspaceNotFound,
            WeaveError::WorkspaceExists(_) => ErrorKind::WorkspaceExists,
            WeaveError::InvalidState(_) | WeaveError::Config(_) | WeaveError::Json(_) => {
                ErrorKind::InvalidState
            }
            WeaveError::InvalidRevision(_) => ErrorKind::InvalidRevision,
            WeaveError::AmbiguousRevision { .. } => ErrorKind::AmbiguousRevision,
            WeaveError::Conflict { .. } => ErrorKind::Conflict,
            WeaveError::CommandFailed { .. }
            | WeaveError::Io(_)
            | WeaveError::Http(_)
            | WeaveError::Provider(_) => ErrorKind::CommandFailed,
            WeaveError::DaemonRunning(_) => ErrorKind::DaemonRunning,
            WeaveError::DaemonNotRunning => ErrorKind::DaemonNotRunning,
        }
    }

    /// True when the backend refused to run because another process holds its lock.
    /// Callers may retry these.
    pub fn is_locked(&self) -> bool {
        match self {
            WeaveError::CommandFailed { stderr, .. } => {
                let lower = stderr.to_lowercase();
                lower.contains("lock") && (lower.contains("locked") || lower.contains("acquire"))
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, WeaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(
            WeaveError::WorkspaceExists("a".into()).kind().as_str(),
            "WORKSPACE_EXISTS"
        );
        assert_eq!(WeaveError::DaemonNotRunning.kind().as_str(), "DAEMON_NOT_RUNNING");
        assert_eq!(
            WeaveError::command_failed("jj log", "boom").kind(),
            ErrorKind::CommandFailed
        );
    }

    #[test]
    fn test_conflict_message_lists_files() {
        let err = WeaveError::Conflict {
            files: vec![FileOwnership {
                path: "file.txt".into(),
                workspaces: vec!["a".into(), "b".into()],
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("file.txt (a, b)"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_ambiguous_revision_lists_candidates() {
        let err = WeaveError::AmbiguousRevision {
            revision: "feat".into(),
            candidates: vec!["abc".into(), "def".into()],
        };
        assert!(err.to_string().contains("abc, def"));
    }

    #[test]
    fn test_is_locked() {
        let err = WeaveError::command_failed(
            "jj status",
            "Error: Failed to acquire lock on working copy",
        );
        assert!(err.is_locked());
        assert!(!WeaveError::command_failed("jj status", "no such revision").is_locked());
    }
}
