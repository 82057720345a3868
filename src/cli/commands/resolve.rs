use crate::cli::current_repo;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::stack::{ConflictInfo, ConflictResolver, ResolveOutcome};
use clap::Subcommand;
use console::style;

#[derive(Debug, Subcommand)]
pub enum ResolveAction {
    /// Move onto the deepest conflicted change of the current stack
    Start,

    /// Fold the fix into the conflicted change and move on (the default)
    Continue,

    /// Show the session in progress and what is still conflicted
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn show(conflict: &ConflictInfo) {
    Output::warning(format!(
        "Now on {} {}",
        style(&conflict.change_id).magenta(),
        conflict.description.lines().next().unwrap_or_default()
    ));
    for file in &conflict.files {
        Output::bullet(file);
    }
    Output::sub_item(format!("{} conflicted change(s) left", conflict.remaining));
    Output::tip("Fix the files, then run `weave resolve` again");
}

pub fn run(action: Option<ResolveAction>) -> Result<()> {
    let repo = current_repo()?;
    let resolver = ConflictResolver::new(&repo);

    match action.unwrap_or(ResolveAction::Continue) {
        ResolveAction::Start => {
            match resolver.begin("@")? {
                Some(conflict) => show(&conflict),
                None => Output::success("No conflicts in the current stack"),
            }
            Ok(())
        }
        ResolveAction::Continue => {
            match resolver.resolve()? {
                ResolveOutcome::NextConflict(conflict) => {
                    Output::success("Resolved");
                    show(&conflict);
                }
                ResolveOutcome::ReturnedTo { target } => {
                    Output::success(format!(
                        "All conflicts resolved, back on {}",
                        style(target).cyan()
                    ));
                }
                ResolveOutcome::StackClean => Output::success("Resolved; the stack is clean"),
            }
            Ok(())
        }
        ResolveAction::Status { json } => {
            let session = resolver.session()?;
            let scope = session
                .as_ref()
                .map(|s| s.rescan_scope())
                .unwrap_or_else(|| "@".to_string());
            let conflicts = resolver.conflicted(&scope)?;
            if json {
                return Output::json(&serde_json::json!({
                    "session": session,
                    "conflicts": conflicts,
                }));
            }
            match &session {
                Some(s) => Output::info(format!(
                    "Resolving since {}, will return to {}",
                    s.started_at.format("%Y-%m-%d %H:%M"),
                    style(s.return_target()).cyan()
                )),
                None => Output::info("No resolution in progress"),
            }
            for change in &conflicts {
                Output::bullet(Output::change(change));
            }
            Ok(())
        }
    }
}
