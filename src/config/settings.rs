use crate::errors::{Result, WeaveError};
use crate::utils::atomic_file;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub trunk: TrunkConfig,
    pub workspace: WorkspaceConfig,
    pub github: GitHubConfig,
    pub daemon: DaemonConfig,
    pub merge: MergeConfig,
    pub jj: JjConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrunkConfig {
    /// Name of the trunk bookmark on the remote
    pub branch: String,
    pub remote: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory holding secondary workspaces. Defaults to `<repo>.workspaces` next to the repo.
    pub root: Option<String>,
    /// Sentinel workspace for files no agent has claimed yet
    pub unassigned: String,
    /// Entries of the main checkout symlinked into every new workspace
    pub editor_links: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
    pub method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JjConfig {
    pub binary: String,
    /// Run `jj git export` after every mutation (only needed for non-colocated repos)
    pub git_export: bool,
}

impl Default for TrunkConfig {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            remote: "origin".to_string(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            unassigned: "unassigned".to_string(),
            editor_links: vec![
                ".vscode".to_string(),
                ".idea".to_string(),
                ".editorconfig".to_string(),
                ".envrc".to_string(),
            ],
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            owner: None,
            repo: None,
            token: None,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            max_wait_secs: 180,
            method: "squash".to_string(),
        }
    }
}

impl Default for JjConfig {
    fn default() -> Self {
        Self {
            binary: "jj".to_string(),
            git_export: false,
        }
    }
}

const VALID_MERGE_METHODS: [&str; 3] = ["merge", "squash", "rebase"];

impl Settings {
    /// Load settings from a file, falling back to defaults when it does not exist
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| WeaveError::config(format!("Failed to read config file: {e}")))?;

        serde_json::from_str(&content)
            .map_err(|e| WeaveError::config(format!("Failed to parse config file: {e}")))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_file::write_json(path, self)
    }

    /// Update a configuration value by dotted key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(WeaveError::config(format!("Invalid config key format: {key}")));
        }

        let optional = |v: &str| {
            if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            }
        };

        match (parts[0], parts[1]) {
            ("trunk", "branch") => self.trunk.branch = value.to_string(),
            ("trunk", "remote") => self.trunk.remote = value.to_string(),
            ("workspace", "root") => self.workspace.root = optional(value),
            ("workspace", "unassigned") => self.workspace.unassigned = value.to_string(),
            ("workspace", "editor_links") => {
                self.workspace.editor_links = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ("github", "api_url") => self.github.api_url = value.to_string(),
            ("github", "owner") => self.github.owner = optional(value),
            ("github", "repo") => self.github.repo = optional(value),
            ("github", "token") => self.github.token = optional(value),
            ("daemon", "interval_secs") => {
                self.daemon.interval_secs = value
                    .parse()
                    .map_err(|_| WeaveError::config(format!("Invalid number: {value}")))?;
            }
            ("merge", "poll_interval_secs") => {
                self.merge.poll_interval_secs = value
                    .parse()
                    .map_err(|_| WeaveError::config(format!("Invalid number: {value}")))?;
            }
            ("merge", "max_wait_secs") => {
                self.merge.max_wait_secs = value
                    .parse()
                    .map_err(|_| WeaveError::config(format!("Invalid number: {value}")))?;
            }
            ("merge", "method") => self.merge.method = value.to_string(),
            ("jj", "binary") => self.jj.binary = value.to_string(),
            ("jj", "git_export") => {
                self.jj.git_export = value
                    .parse()
                    .map_err(|_| WeaveError::config(format!("Invalid boolean value: {value}")))?;
            }
            _ => return Err(WeaveError::config(format!("Unknown config key: {key}"))),
        }

        Ok(())
    }

    /// Get a configuration value by dotted key
    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(WeaveError::config(format!("Invalid config key format: {key}")));
        }

        let value = match (parts[0], parts[1]) {
            ("trunk", "branch") => self.trunk.branch.clone(),
            ("trunk", "remote") => self.trunk.remote.clone(),
            ("workspace", "root") => self.workspace.root.clone().unwrap_or_default(),
            ("workspace", "unassigned") => self.workspace.unassigned.clone(),
            ("workspace", "editor_links") => self.workspace.editor_links.join(","),
            ("github", "api_url") => self.github.api_url.clone(),
            ("github", "owner") => self.github.owner.clone().unwrap_or_default(),
            ("github", "repo") => self.github.repo.clone().unwrap_or_default(),
            ("github", "token") => {
                if self.github.token.is_some() {
                    "********".to_string()
                } else {
                    String::new()
                }
            }
            ("daemon", "interval_secs") => self.daemon.interval_secs.to_string(),
            ("merge", "poll_interval_secs") => self.merge.poll_interval_secs.to_string(),
            ("merge", "max_wait_secs") => self.merge.max_wait_secs.to_string(),
            ("merge", "method") => self.merge.method.clone(),
            ("jj", "binary") => self.jj.binary.clone(),
            ("jj", "git_export") => self.jj.git_export.to_string(),
            _ => return Err(WeaveError::config(format!("Unknown config key: {key}"))),
        };

        Ok(value)
    }

    /// Every key understood by `get_value`/`set_value`
    pub fn keys() -> &'static [&'static str] {
        &[
            "trunk.branch",
            "trunk.remote",
            "workspace.root",
            "workspace.unassigned",
            "workspace.editor_links",
            "github.api_url",
            "github.owner",
            "github.repo",
            "github.token",
            "daemon.interval_secs",
            "merge.poll_interval_secs",
            "merge.max_wait_secs",
            "merge.method",
            "jj.binary",
            "jj.git_export",
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.trunk.branch.trim().is_empty() {
            return Err(WeaveError::config("trunk.branch must not be empty"));
        }
        if self.trunk.remote.trim().is_empty() {
            return Err(WeaveError::config("trunk.remote must not be empty"));
        }
        if self.workspace.unassigned.trim().is_empty() || self.workspace.unassigned == "default" {
            return Err(WeaveError::config(
                "workspace.unassigned must be a non-empty name other than 'default'",
            ));
        }
        if !self.github.api_url.starts_with("http://") && !self.github.api_url.starts_with("https://")
        {
            return Err(WeaveError::config(
                "github.api_url must start with http:// or https://",
            ));
        }
        if self.daemon.interval_secs == 0 {
            return Err(WeaveError::config("daemon.interval_secs must be at least 1"));
        }
        if self.merge.poll_interval_secs == 0 {
            return Err(WeaveError::config("merge.poll_interval_secs must be at least 1"));
        }
        if !VALID_MERGE_METHODS.contains(&self.merge.method.as_str()) {
            return Err(WeaveError::config(format!(
                "Invalid merge method: {}. Valid options: {}",
                self.merge.method,
                VALID_MERGE_METHODS.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.trunk.branch, "main");
        assert_eq!(settings.workspace.unassigned, "unassigned");
    }

    #[test]
    fn test_set_and_get_roundtrip_for_every_key() {
        let mut settings = Settings::default();
        settings.set_value("trunk.branch", "trunk").unwrap();
        settings.set_value("merge.max_wait_secs", "42").unwrap();
        settings.set_value("workspace.editor_links", ".vscode, .zed").unwrap();
        assert_eq!(settings.get_value("trunk.branch").unwrap(), "trunk");
        assert_eq!(settings.get_value("merge.max_wait_secs").unwrap(), "42");
        assert_eq!(settings.workspace.editor_links, vec![".vscode", ".zed"]);

        for key in Settings::keys() {
            assert!(settings.get_value(key).is_ok(), "key {key} not readable");
        }
    }

    #[test]
    fn test_rejects_unknown_and_malformed_keys() {
        let mut settings = Settings::default();
        assert!(settings.set_value("nope", "x").is_err());
        assert!(settings.set_value("trunk.nope", "x").is_err());
        assert!(settings.set_value("daemon.interval_secs", "soon").is_err());
    }

    #[test]
    fn test_token_is_masked() {
        let mut settings = Settings::default();
        settings.set_value("github.token", "secret").unwrap();
        assert_eq!(settings.get_value("github.token").unwrap(), "********");
    }

    #[test]
    fn test_invalid_merge_method() {
        let mut settings = Settings::default();
        settings.merge.method = "octopus".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("weave").join("config.json");
        let mut settings = Settings::default();
        settings.trunk.branch = "develop".to_string();
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.trunk.branch, "develop");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"trunk": {"branch": "dev"}}"#).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.trunk.branch, "dev");
        assert_eq!(loaded.trunk.remote, "origin");
        assert_eq!(loaded.daemon.interval_secs, 30);
    }
}
