use super::resolve::{ConflictInfo, ConflictResolver};
use super::StackEngine;
use crate::errors::{Result, WeaveError};
use crate::jj::backend::revset_symbol;
use crate::jj::{Jj, RebaseMode};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestackResult {
    /// Root bookmarks rebased onto trunk
    pub restacked: usize,
    pub roots: Vec<String>,
    pub pushed: Vec<String>,
    pub fetched: bool,
    /// Set when the rebase surfaced conflicts; the working copy is on the first one
    pub conflict: Option<ConflictInfo>,
}

impl<'a> StackEngine<'a> {
    /// Tracked bookmarks with no tracked bookmark between them and trunk
    pub(crate) fn root_bookmarks(&self, tracked: &BTreeSet<String>) -> Result<Vec<String>> {
        let jj = self.jj();
        let mut roots = Vec::new();
        for name in tracked {
            let revset = format!(
                "heads(({})..({}-) & bookmarks())",
                jj.trunk(),
                revset_symbol(name)
            );
            let tracked_parents: Vec<String> = jj
                .log(&revset)?
                .into_iter()
                .filter_map(|c| c.bookmarks.into_iter().find(|b| tracked.contains(b)))
                .collect();
            match tracked_parents.len() {
                0 => roots.push(name.clone()),
                1 => debug!("{} stacks on {}", name, tracked_parents[0]),
                _ => {
                    return Err(WeaveError::invalid_state(format!(
                        "Bookmark '{}' has several tracked ancestors ({}); restack needs a linear stack",
                        name,
                        tracked_parents.join(", ")
                    )))
                }
            }
        }
        Ok(roots)
    }

    /// Rebase tracked stacks onto the latest trunk and push what moved
    pub fn restack(&self) -> Result<RestackResult> {
        let jj = self.jj();
        let mut result = RestackResult::default();

        match jj.fetch() {
            Ok(()) => result.fetched = true,
            Err(e) => warn!("Fetch failed, restacking against local state: {}", e),
        }

        let bookmarks = jj.bookmarks()?;
        let tracked: BTreeSet<String> = self
            .tracking
            .tracked_names()?
            .into_iter()
            .filter(|name| {
                bookmarks
                    .iter()
                    .any(|b| &b.name == name && b.local.is_some())
            })
            .collect();
        if tracked.is_empty() {
            info!("No tracked bookmarks to restack");
            return Ok(result);
        }

        for root in self.root_bookmarks(&tracked)? {
            let symbol = revset_symbol(&root);
            let on_trunk = format!("{} & ({})::", symbol, jj.trunk());
            if !jj.log(&on_trunk)?.is_empty() {
                debug!("{} already on trunk", root);
                continue;
            }
            jj.rebase(RebaseMode::Branch, &symbol, &jj.trunk())?;
            info!("Rebased {} onto {}", root, jj.trunk());
            result.roots.push(root);
            result.restacked += 1;
        }

        let scope = tracked
            .iter()
            .map(|b| revset_symbol(b))
            .chain(std::iter::once("@".to_string()))
            .collect::<Vec<_>>()
            .join(" | ");
        if let Some(conflict) = ConflictResolver::new(self.repo).begin(&scope)? {
            warn!("Restack produced conflicts; not pushing");
            result.conflict = Some(conflict);
            return Ok(result);
        }

        result.pushed = self.push_ahead(jj, &tracked)?;
        Ok(result)
    }

    /// Push every bookmark in `names` whose local target differs from the remote
    pub(crate) fn push_ahead(&self, jj: &Jj, names: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut pushed = Vec::new();
        for bookmark in jj.bookmarks()? {
            if names.contains(&bookmark.name) && bookmark.is_ahead() {
                jj.push_bookmark(&bookmark.name)?;
                info!("Pushed {}", bookmark.name);
                pushed.push(bookmark.name);
            }
        }
        Ok(pushed)
    }
}
