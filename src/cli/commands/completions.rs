use crate::cli::output::Output;
use crate::cli::Cli;
use crate::errors::{Result, WeaveError};
use clap::{CommandFactory, Subcommand};
use clap_complete::{generate, Shell};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const BIN_NAME: &str = "weave";

#[derive(Debug, Subcommand)]
pub enum CompletionsAction {
    /// Print completions for a shell to stdout
    Generate {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Install completions for the current (or given) shell
    Install {
        #[arg(long, value_enum)]
        shell: Option<Shell>,
    },

    /// Show where completions are installed
    Status,
}

pub fn run(action: CompletionsAction) -> Result<()> {
    match action {
        CompletionsAction::Generate { shell } => {
            generate(shell, &mut Cli::command(), BIN_NAME, &mut io::stdout());
            Ok(())
        }
        CompletionsAction::Install { shell } => {
            let shell = shell.or_else(detect_current_shell).ok_or_else(|| {
                WeaveError::invalid_input("Could not detect the shell; pass --shell")
            })?;
            let path = install(shell)?;
            Output::success(format!("Installed {shell:?} completions"));
            Output::sub_item(path.display());
            Output::tip("Restart your shell to pick them up");
            Ok(())
        }
        CompletionsAction::Status => {
            for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
                match completion_file(shell) {
                    Some(path) if path.exists() => {
                        Output::success(format!("{shell:?}: {}", path.display()))
                    }
                    _ => Output::bullet(format!("{shell:?}: not installed")),
                }
            }
            Ok(())
        }
    }
}

fn detect_current_shell() -> Option<Shell> {
    let shell_path = std::env::var("SHELL").ok()?;
    match Path::new(&shell_path).file_name()?.to_str()? {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        _ => None,
    }
}

/// User-level completion file for `shell`
fn completion_file(shell: Shell) -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    match shell {
        Shell::Bash => Some(
            dirs::data_local_dir()
                .unwrap_or_else(|| home.join(".local/share"))
                .join("bash-completion/completions")
                .join(BIN_NAME),
        ),
        Shell::Zsh => Some(home.join(".zsh/completions").join(format!("_{BIN_NAME}"))),
        Shell::Fish => Some(
            dirs::config_dir()
                .unwrap_or_else(|| home.join(".config"))
                .join("fish/completions")
                .join(format!("{BIN_NAME}.fish")),
        ),
        _ => None,
    }
}

fn install(shell: Shell) -> Result<PathBuf> {
    let path = completion_file(shell)
        .ok_or_else(|| WeaveError::invalid_input(format!("Unsupported shell: {shell:?}")))?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut content = Vec::new();
    generate(shell, &mut Cli::command(), BIN_NAME, &mut content);
    fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_completions_mention_subcommands() {
        let mut content = Vec::new();
        generate(Shell::Bash, &mut Cli::command(), BIN_NAME, &mut content);
        let script = String::from_utf8(content).unwrap();
        assert!(script.contains("workspace"));
        assert!(script.contains("focus"));
    }
}
