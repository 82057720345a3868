use super::resolve::{ConflictInfo, ConflictResolver};
use super::{comment, focus_commits, StackEngine};
use crate::errors::Result;
use crate::jj::RebaseMode;
use crate::providers::{PrInfo, PrState, PullRequestProvider, UpdatePr};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub rebased_roots: usize,
    pub abandoned: usize,
    pub untracked: Vec<String>,
    pub deleted: Vec<String>,
    pub comments_updated: usize,
    pub has_conflicts: bool,
    /// Set when the rebase surfaced conflicts; the working copy is on the first one
    pub conflict: Option<ConflictInfo>,
}

/// Everything `sync` rebases, and so everything that may come back conflicted
const SYNC_SCOPE: &str = "mutable()";

impl<'a> StackEngine<'a> {
    /// Fetch, move trunk, rebase everything mutable onto it and clean up what landed.
    /// Conflicts start a resolution session; fixing them is left to the caller.
    pub async fn sync(&self, provider: Option<&dyn PullRequestProvider>) -> Result<SyncResult> {
        let jj = self.jj();
        let trunk = jj.trunk();
        let mut result = SyncResult::default();

        jj.fetch()?;
        jj.bookmark_set(jj.trunk_branch(), &trunk, true)?;

        let roots_revset = format!(
            "roots((({trunk})..mutable()) ~ ({trunk}):: ~ {})",
            focus_commits()
        );
        let roots = jj.log(&roots_revset)?;
        if !roots.is_empty() {
            jj.rebase(RebaseMode::Source, &roots_revset, &trunk)?;
            info!("Rebased {} root(s) onto {}", roots.len(), trunk);
        }
        result.rebased_roots = roots.len();

        let empty_revset = format!(
            "(({trunk})..@) & empty() & ~merges() & ~@ & ~{}",
            focus_commits()
        );
        let empty: Vec<String> = jj
            .log(&empty_revset)?
            .into_iter()
            .map(|c| c.commit_id)
            .collect();
        if !empty.is_empty() {
            jj.abandon(&empty)?;
            info!("Abandoned {} empty change(s)", empty.len());
        }
        result.abandoned = empty.len();

        self.collect_orphans(&mut result)?;

        if let Some(provider) = provider {
            result.comments_updated = self.refresh_stack_comments(provider).await?;
        }

        result.conflict = ConflictResolver::new(self.repo).begin(SYNC_SCOPE)?;
        result.has_conflicts = result.conflict.is_some();
        if result.has_conflicts {
            warn!("Sync left conflicts behind");
        }
        Ok(result)
    }

    /// Untrack bookmarks whose local target is gone; delete never-pushed ones that became empty
    fn collect_orphans(&self, result: &mut SyncResult) -> Result<()> {
        let jj = self.jj();
        let bookmarks = jj.bookmarks()?;
        for name in self.tracking.tracked_names()? {
            let bookmark = bookmarks.iter().find(|b| b.name == name);
            if bookmark.is_some_and(|b| b.conflicted) {
                warn!("{} is conflicted; leaving it tracked", name);
                continue;
            }
            match bookmark.and_then(|b| b.local.as_ref().map(|l| (b, l))) {
                None => {
                    self.tracking.untrack(&name)?;
                    debug!("Untracked {} (no local target)", name);
                    result.untracked.push(name);
                }
                Some((b, local)) if b.remote.is_none() && local.empty => {
                    jj.bookmark_delete(&[name.clone()])?;
                    self.tracking.untrack(&name)?;
                    debug!("Deleted empty unpushed bookmark {}", name);
                    result.deleted.push(name);
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Rewrite the managed stack block in every open PR of the current stack
    pub(crate) async fn refresh_stack_comments(
        &self,
        provider: &dyn PullRequestProvider,
    ) -> Result<usize> {
        let names: Vec<String> = self.stack()?.into_iter().map(|e| e.bookmark).collect();
        if names.is_empty() {
            return Ok(0);
        }
        let found = provider.find_by_branches(&names).await?;
        let prs: Vec<PrInfo> = names
            .iter()
            .filter_map(|n| found.iter().find(|p| &p.head == n && p.state == PrState::Open))
            .cloned()
            .collect();
        self.write_stack_comments(provider, &prs).await
    }

    /// Returns how many PR bodies actually changed
    pub(crate) async fn write_stack_comments(
        &self,
        provider: &dyn PullRequestProvider,
        prs: &[PrInfo],
    ) -> Result<usize> {
        let mut updated = 0;
        for pr in prs {
            // A lone PR is not a stack; drop any overview left from when it was one
            let body = if prs.len() < 2 {
                comment::strip(&pr.body)
            } else {
                comment::upsert(&pr.body, &comment::render(prs, pr.number))
            };
            if body == pr.body {
                continue;
            }
            match provider
                .update(
                    pr.number,
                    UpdatePr {
                        body: Some(body),
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(_) => updated += 1,
                Err(e) => warn!("Could not update stack comment on #{}: {}", pr.number, e),
            }
        }
        Ok(updated)
    }
}
