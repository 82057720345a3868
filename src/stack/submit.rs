use super::StackEngine;
use crate::errors::{Result, WeaveError};
use crate::providers::{CreatePr, PrInfo, PrState, PullRequestProvider, UpdatePr};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmitResult {
    pub created: Vec<PrInfo>,
    pub updated: Vec<PrInfo>,
    pub unchanged: Vec<PrInfo>,
    pub pushed: Vec<String>,
    /// Bookmarks left out because their PR was merged or closed elsewhere.
    /// Merged ones are untracked; closed ones stay tracked without a PR record.
    pub skipped: Vec<String>,
    /// Open PRs of the stack, bottom to top
    pub stack: Vec<PrInfo>,
}

impl<'a> StackEngine<'a> {
    /// Push every bookmark of the current stack and create or update one PR each,
    /// chaining each PR's base onto the bookmark below it.
    pub async fn submit(
        &self,
        provider: &dyn PullRequestProvider,
        draft: bool,
    ) -> Result<SubmitResult> {
        let jj = self.jj();
        let stack = self.stack()?;
        if stack.is_empty() {
            return Err(WeaveError::invalid_state(
                "No bookmarks between trunk and the working copy; create one with `jj bookmark create`",
            ));
        }

        let names: Vec<String> = stack.iter().map(|e| e.bookmark.clone()).collect();
        let existing = provider.find_by_branches(&names).await?;
        let mut result = SubmitResult::default();

        let bookmarks = jj.bookmarks()?;
        let mut base = jj.trunk_branch().to_string();

        for entry in stack {
            let name = entry.bookmark;
            let current = existing.iter().find(|p| p.head == name).cloned();

            match current.as_ref().map(|p| p.state) {
                Some(PrState::Merged) => {
                    info!("{} was merged, untracking", name);
                    self.tracking.untrack(&name)?;
                    result.skipped.push(name);
                    continue;
                }
                Some(PrState::Closed) => {
                    warn!(
                        "PR for {} was closed outside weave; skipping it (reopen it or rename the bookmark)",
                        name
                    );
                    self.tracking.clear_pr(&name)?;
                    result.skipped.push(name);
                    continue;
                }
                _ => {}
            }

            let ahead = bookmarks
                .iter()
                .find(|b| b.name == name)
                .map(|b| b.is_ahead())
                .unwrap_or(true);
            if ahead {
                jj.push_bookmark(&name)?;
                result.pushed.push(name.clone());
            }

            let pr = match current {
                Some(pr) if pr.base == base => {
                    result.unchanged.push(pr.clone());
                    pr
                }
                Some(pr) => {
                    info!("Retargeting #{} from {} to {}", pr.number, pr.base, base);
                    let pr = provider
                        .update(
                            pr.number,
                            UpdatePr {
                                base: Some(base.clone()),
                                ..Default::default()
                            },
                        )
                        .await?;
                    result.updated.push(pr.clone());
                    pr
                }
                None => {
                    let description = jj.full_description(&entry.change.commit_id)?;
                    let (title, body) = split_description(&description, &name);
                    let pr = provider
                        .create(CreatePr {
                            head: name.clone(),
                            base: base.clone(),
                            title,
                            body,
                            draft,
                        })
                        .await?;
                    info!("Created #{} for {}", pr.number, name);
                    result.created.push(pr.clone());
                    pr
                }
            };

            self.tracking.set_pr(&name, pr.clone())?;
            base = name;
            result.stack.push(pr);
        }

        self.write_stack_comments(provider, &result.stack).await?;
        Ok(result)
    }
}

/// First line as title, the rest as body
fn split_description(description: &str, fallback: &str) -> (String, String) {
    let mut lines = description.lines();
    let title = lines
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback)
        .to_string();
    let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();
    (title, body)
}
