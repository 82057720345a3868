use crate::cli::output::Output;
use crate::config::{self, Settings};
use crate::errors::Result;
use clap::Subcommand;
use console::style;
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g. trunk.branch)
        key: String,
        value: String,
    },

    /// Get a configuration value
    Get { key: String },

    /// List all configuration values
    List,

    /// Reset a configuration value to its default
    Unset { key: String },

    /// Print the settings file location
    Path,
}

fn settings_file() -> Result<PathBuf> {
    let location = config::find_repository(&std::env::current_dir()?)?;
    Ok(config::get_repo_meta_dir(&location.root).join("config.json"))
}

/// Apply `key = value` to the settings stored at `file`, validating before saving
pub fn set_in_file(file: &std::path::Path, key: &str, value: &str) -> Result<Settings> {
    let mut settings = Settings::load_from_file(file)?;
    settings.set_value(key, value)?;
    settings.validate()?;
    settings.save_to_file(file)?;
    Ok(settings)
}

pub fn run(action: ConfigAction) -> Result<()> {
    let file = settings_file()?;

    match action {
        ConfigAction::Set { key, value } => {
            set_in_file(&file, &key, &value)?;
            let shown = if key.contains("token") { "********" } else { &value };
            Output::success(format!("Configuration updated: {key} = {shown}"));
            if key == "github.token" {
                Output::tip("GITHUB_TOKEN or GH_TOKEN in the environment work too");
            }
            Ok(())
        }
        ConfigAction::Get { key } => {
            let value = Settings::load_from_file(&file)?.get_value(&key)?;
            if value.is_empty() {
                println!("{key} = {}", style("(not set)").dim());
            } else {
                println!("{key} = {value}");
            }
            Ok(())
        }
        ConfigAction::List => {
            let settings = Settings::load_from_file(&file)?;
            let mut section = "";
            for key in Settings::keys() {
                let (group, _) = key.split_once('.').unwrap_or((key, ""));
                if group != section {
                    Output::section(group);
                    section = group;
                }
                let value = settings.get_value(key)?;
                if value.is_empty() {
                    println!("  {key} = {}", style("(not set)").dim());
                } else {
                    println!("  {key} = {value}");
                }
            }
            Ok(())
        }
        ConfigAction::Unset { key } => {
            let default = Settings::default().get_value(&key)?;
            set_in_file(&file, &key, &default)?;
            Output::success(format!("Reset {key}"));
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", file.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_in_file_validates_before_saving() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("config.json");

        set_in_file(&file, "trunk.branch", "develop").unwrap();
        assert!(set_in_file(&file, "merge.method", "octopus").is_err());

        let saved = Settings::load_from_file(&file).unwrap();
        assert_eq!(saved.trunk.branch, "develop");
        assert_eq!(saved.merge.method, "squash");
    }

    #[test]
    fn test_unset_restores_default() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("config.json");
        set_in_file(&file, "github.owner", "acme").unwrap();

        let default = Settings::default().get_value("github.owner").unwrap();
        let settings = set_in_file(&file, "github.owner", &default).unwrap();
        assert_eq!(settings.github.owner, None);
    }
}
