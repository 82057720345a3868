use crate::cli::current_repo;
use crate::cli::output::Output;
use crate::errors::{Result, WeaveError};
use crate::focus::{FocusEngine, FocusOutcome};
use clap::Subcommand;
use console::style;

#[derive(Debug, Subcommand)]
pub enum FocusAction {
    /// Add workspaces to the preview (fails if they touch the same files)
    Add {
        #[arg(required = true)]
        workspaces: Vec<String>,
    },

    /// Focus every agent workspace
    All,

    /// Focus exactly one workspace
    Only { workspace: String },

    /// Focus one workspace and print its path for editing
    Edit { workspace: String },

    /// Drop workspaces from the preview
    #[command(visible_alias = "rm")]
    Remove {
        #[arg(required = true)]
        workspaces: Vec<String>,
    },

    /// Clear the preview
    None,

    /// Rebuild the preview from the current focus set
    Refresh,

    /// Show the focused workspaces and the preview
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Settle a file claimed by several workspaces by keeping one owner
    Keep {
        file: String,
        /// Workspace whose version wins
        workspace: String,
    },
}

fn report(outcome: &FocusOutcome) {
    match outcome {
        FocusOutcome::Cleared { abandoned } => {
            Output::success("Preview cleared");
            if *abandoned > 0 {
                Output::sub_item(format!("Abandoned {abandoned} preview commit(s)"));
            }
        }
        FocusOutcome::Focused {
            workspaces,
            preview,
            ..
        } => {
            Output::success(format!("Focused: {}", style(workspaces.join(", ")).cyan()));
            Output::sub_item(format!("Preview: {}", style(preview).magenta()));
        }
    }
}

pub fn run(action: FocusAction) -> Result<()> {
    let repo = current_repo()?;
    let engine = FocusEngine::new(&repo);

    let result = match action {
        FocusAction::Add { workspaces } => engine.focus_add(&workspaces),
        FocusAction::All => engine.focus_all(),
        FocusAction::Only { workspace } => engine.focus_only(&workspace),
        FocusAction::Edit { workspace } => {
            let (outcome, path) = engine.focus_edit(&workspace)?;
            report(&outcome);
            println!("{}", path.display());
            return Ok(());
        }
        FocusAction::Remove { workspaces } => engine.focus_remove(&workspaces),
        FocusAction::None => engine.focus_none(),
        FocusAction::Refresh => match engine.refresh()? {
            Some(outcome) => Ok(outcome),
            None => {
                Output::info("Nothing is focused");
                return Ok(());
            }
        },
        FocusAction::Status { json } => {
            let status = engine.status()?;
            if json {
                return Output::json(&status);
            }
            if status.workspaces.is_empty() {
                Output::info("Nothing is focused");
            } else {
                Output::section("Focused workspaces");
                for ws in &status.workspaces {
                    Output::bullet(ws);
                }
            }
            if let Some(preview) = &status.preview {
                Output::sub_item(format!("Preview: {}", Output::change(preview)));
            }
            match &status.baseline {
                Some(baseline) => Output::sub_item(format!("Baseline: {}", Output::change(baseline))),
                None => Output::sub_item("Baseline: trunk"),
            }
            return Ok(());
        }
        FocusAction::Keep { file, workspace } => {
            let resolved = engine.resolve_conflict(&file, &workspace)?;
            Output::success(format!(
                "'{}' now owns {}",
                resolved.kept,
                style(&resolved.file).cyan()
            ));
            if !resolved.unfocused.is_empty() {
                Output::sub_item(format!("Unfocused: {}", resolved.unfocused.join(", ")));
            }
            if let Some(outcome) = &resolved.outcome {
                report(outcome);
            }
            return Ok(());
        }
    };

    match result {
        Ok(outcome) => {
            report(&outcome);
            Ok(())
        }
        Err(WeaveError::Conflict { files }) => {
            Output::error("These files are modified by more than one workspace:");
            for f in &files {
                Output::bullet(format!("{} ({})", f.path, f.workspaces.join(", ")));
            }
            Output::tip("Keep one owner per file:");
            Output::command_example("weave focus keep <file> <workspace>");
            Err(WeaveError::Conflict { files })
        }
        Err(e) => Err(e),
    }
}
