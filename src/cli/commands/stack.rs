use crate::cli::current_repo;
use crate::cli::output::Output;
use crate::errors::{Result, WeaveError};
use crate::focus::FocusEngine;
use crate::providers::github::GitHubProvider;
use crate::providers::{MergeMethod, PrInfo, PullRequestProvider};
use crate::repo::WeaveRepo;
use crate::stack::{ConflictInfo, StackEngine};
use crate::utils::spinner::Spinner;
use clap::Subcommand;
use console::style;
use tracing::warn;

#[derive(Debug, Subcommand)]
pub enum StackAction {
    /// Show the bookmarks between trunk and the working copy
    #[command(visible_alias = "ls")]
    Show {
        #[arg(long)]
        json: bool,
    },

    /// Put a bookmark under management
    Track { bookmark: String },

    /// Stop managing a bookmark (the bookmark itself is kept)
    Untrack { bookmark: String },

    /// Rebase tracked stacks onto trunk and push what moved
    Restack,

    /// Fetch, move everything onto trunk and clean up what landed
    Sync {
        /// Leave the preview alone afterwards
        #[arg(long)]
        no_refresh: bool,
    },

    /// Push the stack and open or update one PR per bookmark
    Submit {
        /// Open new PRs as drafts
        #[arg(long)]
        draft: bool,
    },

    /// Land PRs bottom-up
    Merge {
        /// PR numbers (defaults to every PR of the current stack)
        prs: Vec<u64>,
        /// merge, squash or rebase (defaults to merge.method)
        #[arg(long, short)]
        method: Option<String>,
    },

    /// Recreate a remote PR stack locally
    Get {
        /// PR number, #number, PR URL or branch name
        target: String,
    },

    /// Move some files of a change into a new change before it
    Split {
        #[arg(long, short, default_value = "@")]
        revision: String,
        #[arg(long, short)]
        message: String,
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Reword a change or fold the working copy into it
    Modify {
        #[arg(long, short)]
        revision: Option<String>,
        #[arg(long, short)]
        message: Option<String>,
        /// Move the working copy's edits into the change
        #[arg(long)]
        include_working_copy: bool,
        /// Allow rewriting changes that were already pushed
        #[arg(long)]
        force: bool,
    },

    /// Fold a change into its parent
    Squash {
        #[arg(long, short)]
        revision: Option<String>,
    },

    /// Hand pending files from the unassigned workspace to a workspace
    Assign {
        workspace: String,
        #[arg(required = true)]
        files: Vec<String>,
    },
}

fn provider(repo: &WeaveRepo) -> Result<GitHubProvider> {
    let remote_url = repo.root_jj().remote_url()?;
    GitHubProvider::from_settings(repo.settings(), remote_url.as_deref())
}

fn pr_line(pr: &PrInfo) -> String {
    format!(
        "{} {} {}",
        style(format!("#{}", pr.number)).cyan(),
        pr.head,
        style(&pr.url).dim()
    )
}

fn report_conflict(conflict: &ConflictInfo) {
    Output::warning(format!(
        "Conflict in {} {}",
        style(&conflict.change_id).magenta(),
        conflict.description.lines().next().unwrap_or_default()
    ));
    for file in &conflict.files {
        Output::bullet(file);
    }
    if conflict.remaining > 1 {
        Output::sub_item(format!("{} conflicted change(s) in total", conflict.remaining));
    }
    Output::tip("Fix the files, then run:");
    Output::command_example("weave resolve");
}

pub async fn run(action: StackAction) -> Result<()> {
    let repo = current_repo()?;
    let engine = StackEngine::new(&repo);

    match action {
        StackAction::Show { json } => {
            let stack = engine.stack()?;
            if json {
                return Output::json(&stack);
            }
            if stack.is_empty() {
                Output::info("No bookmarks between trunk and the working copy");
                return Ok(());
            }
            for entry in stack.iter().rev() {
                let tracked = if entry.tracked {
                    style("●").green()
                } else {
                    style("○").dim()
                };
                let pr = entry
                    .pr
                    .as_ref()
                    .map(|p| {
                        let review = p
                            .review_decision
                            .as_deref()
                            .map(|d| format!(" {}", style(d.to_lowercase().replace('_', " ")).yellow()))
                            .unwrap_or_default();
                        format!(" {}{}", style(format!("#{} {}", p.number, p.state)).cyan(), review)
                    })
                    .unwrap_or_default();
                println!("{} {}{} {}", tracked, entry.bookmark, pr, style(entry.change.title()).dim());
            }
            Ok(())
        }
        StackAction::Track { bookmark } => {
            if engine.track(&bookmark)? {
                Output::success(format!("Tracking {bookmark}"));
            } else {
                Output::info(format!("{bookmark} is already tracked"));
            }
            Ok(())
        }
        StackAction::Untrack { bookmark } => {
            engine.untrack(&bookmark)?;
            Output::success(format!("No longer tracking {bookmark}"));
            Ok(())
        }
        StackAction::Restack => {
            let spinner = Spinner::new("Restacking...");
            let result = engine.restack();
            spinner.stop();
            let result = result?;

            if !result.fetched {
                Output::warning("Fetch failed; restacked against local state");
            }
            if result.restacked == 0 {
                Output::success("Tracked stacks are already on trunk");
            } else {
                Output::success(format!(
                    "Rebased {} root(s): {}",
                    result.restacked,
                    result.roots.join(", ")
                ));
            }
            if let Some(conflict) = &result.conflict {
                report_conflict(conflict);
                return Ok(());
            }
            for name in &result.pushed {
                Output::sub_item(format!("Pushed {name}"));
            }
            Ok(())
        }
        StackAction::Sync { no_refresh } => {
            let provider = match provider(&repo) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("Skipping PR stack comments: {}", e);
                    None
                }
            };
            let spinner = Spinner::new("Syncing with trunk...");
            let result = engine
                .sync(provider.as_ref().map(|p| p as &dyn PullRequestProvider))
                .await;
            spinner.stop();
            let result = result?;

            Output::success("Synced with trunk");
            if result.rebased_roots > 0 {
                Output::sub_item(format!("Rebased {} root(s)", result.rebased_roots));
            }
            if result.abandoned > 0 {
                Output::sub_item(format!("Abandoned {} empty change(s)", result.abandoned));
            }
            for name in result.deleted.iter().chain(result.untracked.iter()) {
                Output::sub_item(format!("Dropped {name}"));
            }
            if result.comments_updated > 0 {
                Output::sub_item(format!("Updated {} stack comment(s)", result.comments_updated));
            }

            if let Some(conflict) = &result.conflict {
                // refreshing the preview would move the working copy off the conflict
                report_conflict(conflict);
                return Ok(());
            }
            if !no_refresh {
                if let Some(outcome) = FocusEngine::new(&repo).refresh()? {
                    Output::sub_item(format!(
                        "Rebuilt preview: {}",
                        outcome.workspaces().join(", ")
                    ));
                }
            }
            Ok(())
        }
        StackAction::Submit { draft } => {
            let provider = provider(&repo)?;
            let spinner = Spinner::new("Submitting stack...");
            let result = engine.submit(&provider, draft).await;
            spinner.stop();
            let result = result?;

            for pr in &result.created {
                Output::success(format!("Created {}", pr_line(pr)));
            }
            for pr in &result.updated {
                Output::success(format!("Retargeted {} onto {}", pr_line(pr), pr.base));
            }
            for pr in &result.unchanged {
                Output::sub_item(format!("Up to date {}", pr_line(pr)));
            }
            for name in &result.skipped {
                Output::warning(format!("Skipped {name} (PR already merged or closed)"));
            }
            Ok(())
        }
        StackAction::Merge { prs, method } => {
            let method: MergeMethod = method
                .as_deref()
                .unwrap_or(&repo.settings().merge.method)
                .parse()?;
            let numbers = if prs.is_empty() {
                engine
                    .stack()?
                    .into_iter()
                    .filter_map(|e| e.pr.map(|p| p.number))
                    .collect()
            } else {
                prs
            };
            if numbers.is_empty() {
                return Err(WeaveError::invalid_input(
                    "No PRs given and none recorded for the current stack; run `weave stack submit` first",
                ));
            }

            let provider = provider(&repo)?;
            let spinner = Spinner::new(format!("Merging {} PR(s)...", numbers.len()));
            let result = engine.merge(&provider, &numbers, method).await;
            spinner.stop();
            let result = result?;

            for number in &result.merged {
                Output::success(format!("Merged #{number}"));
            }
            Output::tip("Bring local state up to date with:");
            Output::command_example("weave stack sync");
            Ok(())
        }
        StackAction::Get { target } => {
            let provider = provider(&repo)?;
            let spinner = Spinner::new("Fetching PR stack...");
            let result = engine.get(&provider, &target).await;
            spinner.stop();
            let result = result?;

            Output::success(format!("Checked out {}", pr_line(&result.target)));
            for name in &result.restored {
                Output::sub_item(format!("Restored {name}"));
            }
            for pr in &result.skipped {
                Output::warning(format!("Skipped {} (#{} is {})", pr.head, pr.number, pr.state));
            }
            Ok(())
        }
        StackAction::Split {
            revision,
            message,
            files,
        } => {
            let result = engine.split(&revision, &message, &files)?;
            Output::success(format!(
                "Split {} file(s) out of {}",
                result.files.len(),
                style(&result.revision).magenta()
            ));
            Ok(())
        }
        StackAction::Modify {
            revision,
            message,
            include_working_copy,
            force,
        } => {
            let result = engine.modify(
                revision.as_deref(),
                message.as_deref(),
                include_working_copy,
                force,
            )?;
            Output::success(format!("Modified {}", style(&result.change_id).magenta()));
            if result.absorbed_working_copy {
                Output::sub_item("Folded in the working copy");
            }
            Ok(())
        }
        StackAction::Squash { revision } => {
            let result = engine.squash(revision.as_deref())?;
            Output::success(format!(
                "Squashed {} into {}",
                style(&result.absorbed).magenta(),
                style(&result.into).magenta()
            ));
            for name in &result.untracked {
                Output::sub_item(format!("Untracked {name}"));
            }
            Ok(())
        }
        StackAction::Assign { workspace, files } => {
            let result = engine.assign(&files, &workspace)?;
            Output::success(format!(
                "Assigned {} file(s) to {}",
                result.files.len(),
                result.workspace
            ));
            Ok(())
        }
    }
}
