use crate::cli::current_repo;
use crate::cli::output::Output;
use crate::errors::{Result, WeaveError};
use crate::focus::FocusEngine;
use crate::workspace::{RemoteBaseline, WorkspaceManager};
use clap::Subcommand;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};

#[derive(Debug, Subcommand)]
pub enum WorkspaceAction {
    /// Create a workspace rooted at trunk
    Add {
        name: String,
        /// Also compose it into the preview
        #[arg(long)]
        focus: bool,
    },

    /// Delete a workspace (unfocusing it first)
    #[command(visible_alias = "rm")]
    Remove {
        name: String,
        /// Discard unpushed changes
        #[arg(long, short)]
        force: bool,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// List workspaces
    #[command(visible_alias = "ls")]
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show what a workspace would ship, relative to what it already pushed
    Status {
        name: String,
        #[arg(long)]
        json: bool,
    },

    /// Capture a workspace's on-disk edits now
    Snapshot { name: String },
}

pub fn run(action: WorkspaceAction) -> Result<()> {
    let repo = current_repo()?;
    let manager = WorkspaceManager::new(&repo);

    match action {
        WorkspaceAction::Add { name, focus } => {
            if name != repo.unassigned() && manager.ensure_unassigned()? {
                Output::info(format!(
                    "Created the '{}' workspace for unclaimed files",
                    repo.unassigned()
                ));
            }
            let info = manager.add(&name)?;
            Output::success(format!("Created workspace '{}'", name));
            Output::sub_item(format!("Path: {}", style(info.path.display()).cyan()));
            if focus {
                let outcome = FocusEngine::new(&repo).focus_add(&[name])?;
                Output::sub_item(format!("Focused: {}", outcome.workspaces().join(", ")));
            }
            Ok(())
        }
        WorkspaceAction::Remove { name, force, yes } => {
            if !yes {
                let prompt = if force {
                    format!("Remove workspace '{name}' and discard its unpushed changes?")
                } else {
                    format!("Remove workspace '{name}'?")
                };
                let confirmed = Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(prompt)
                    .default(false)
                    .interact()
                    .map_err(|e| WeaveError::invalid_input(format!("Input error: {e}")))?;
                if !confirmed {
                    Output::info("Cancelled");
                    return Ok(());
                }
            }
            manager.remove(&name, force)?;
            Output::success(format!("Removed workspace '{name}'"));
            Ok(())
        }
        WorkspaceAction::List { json } => {
            let workspaces = manager.list()?;
            if json {
                return Output::json(&workspaces);
            }
            if workspaces.is_empty() {
                Output::info("No workspaces");
                return Ok(());
            }
            for ws in workspaces {
                let marker = if ws.focused {
                    style("*").green().to_string()
                } else {
                    " ".to_string()
                };
                println!(
                    "{} {:<20} {} {}",
                    marker,
                    ws.name,
                    style(&ws.tip).magenta(),
                    style(ws.path.display()).dim()
                );
            }
            Ok(())
        }
        WorkspaceAction::Status { name, json } => {
            let status = manager.status(&name)?;
            if json {
                return Output::json(&status);
            }
            Output::section(format!("Workspace {}", status.name));
            Output::sub_item(format!("Tip: {}", Output::change(&status.tip)));
            match (&status.bookmark, &status.baseline) {
                (Some(bookmark), RemoteBaseline::Pushed { .. }) => Output::sub_item(format!(
                    "Compared to pushed {}",
                    style(format!("{bookmark}@origin")).cyan()
                )),
                (Some(bookmark), RemoteBaseline::Trunk) => Output::sub_item(format!(
                    "Bookmark {} not pushed yet; compared to trunk",
                    style(bookmark).cyan()
                )),
                (None, _) => Output::sub_item("No bookmark; compared to trunk"),
            }
            if status.files.is_empty() {
                Output::success("Nothing to ship");
            }
            for file in &status.files {
                Output::bullet(format!("{} {}", file.status, file.path));
            }
            Ok(())
        }
        WorkspaceAction::Snapshot { name } => {
            if !repo.workspace_exists(&name) {
                return Err(WeaveError::WorkspaceNotFound(name));
            }
            manager.snapshot(&name)?;
            Output::success(format!("Snapshotted '{name}'"));
            Ok(())
        }
    }
}
