//! Stacked bookmarks mapped onto hosted PRs, kept rebased on trunk.
//!
//! Every operation is a sequence of backend calls that stops at the first
//! failure. Nothing is rolled back automatically (`jj op undo` is the escape
//! hatch), but tracking metadata is written only after the backend mutation it
//! describes has succeeded.

pub mod comment;
pub mod get;
pub mod merge;
pub mod reshape;
pub mod resolve;
pub mod restack;
pub mod submit;
pub mod sync;
pub mod tracking;

pub use get::{GetResult, GetTarget};
pub use merge::MergeResult;
pub use reshape::{AssignResult, ModifyResult, SplitResult, SquashResult};
pub use resolve::{ConflictInfo, ConflictResolver, ResolveOutcome, ResolveSession};
pub use restack::RestackResult;
pub use submit::SubmitResult;
pub use sync::SyncResult;
pub use tracking::{TrackedBookmark, TrackingStore};

use crate::errors::{Result, WeaveError};
use crate::focus::{BASELINE_TAG, PREVIEW_TAG};
use crate::jj::{Change, Jj};
use crate::providers::PrInfo;
use crate::repo::WeaveRepo;
use crate::utils::quote_expr;
use serde::Serialize;
use tracing::info;

/// One bookmark of the current stack
#[derive(Debug, Clone, Serialize)]
pub struct StackEntry {
    pub bookmark: String,
    pub change: Change,
    pub tracked: bool,
    pub pr: Option<PrInfo>,
}

/// Revset matching the preview/baseline commits the focus engine owns
pub(crate) fn focus_commits() -> String {
    format!(
        "(description(substring:{}) | description(substring:{}))",
        quote_expr(PREVIEW_TAG),
        quote_expr(BASELINE_TAG)
    )
}

pub struct StackEngine<'a> {
    repo: &'a WeaveRepo,
    tracking: TrackingStore,
}

impl<'a> StackEngine<'a> {
    pub fn new(repo: &'a WeaveRepo) -> Self {
        Self {
            repo,
            tracking: TrackingStore::new(&repo.meta_dir()),
        }
    }

    /// Backend bound to the workspace the command runs in
    fn jj(&self) -> &Jj {
        self.repo.jj()
    }

    pub fn tracking(&self) -> &TrackingStore {
        &self.tracking
    }

    /// Bookmarked changes between trunk and the working copy, bottom to top
    pub fn stack(&self) -> Result<Vec<StackEntry>> {
        let jj = self.jj();
        let tracked = self.tracking.load()?;
        let revset = format!("({})..@ & bookmarks()", jj.trunk());

        let mut entries = Vec::new();
        for change in jj.log_reversed(&revset)? {
            // One bookmark per change keeps the base chain linear
            let Some(bookmark) = change.bookmarks.first().cloned() else {
                continue;
            };
            let record = tracked.get(&bookmark);
            entries.push(StackEntry {
                tracked: record.is_some(),
                pr: record.and_then(|r| r.pr.clone()),
                bookmark,
                change,
            });
        }
        Ok(entries)
    }

    /// Put an existing local bookmark under management
    pub fn track(&self, bookmark: &str) -> Result<bool> {
        let exists = self
            .jj()
            .bookmark(bookmark)?
            .map(|b| b.local.is_some())
            .unwrap_or(false);
        if !exists {
            return Err(WeaveError::not_found(format!("Bookmark '{bookmark}'")));
        }
        let added = self.tracking.track(bookmark)?;
        if added {
            info!("Tracking {}", bookmark);
        }
        Ok(added)
    }

    pub fn untrack(&self, bookmark: &str) -> Result<bool> {
        let removed = self.tracking.untrack(bookmark)?;
        if !removed {
            return Err(WeaveError::not_found(format!(
                "Bookmark '{bookmark}' is not tracked"
            )));
        }
        Ok(removed)
    }
}
