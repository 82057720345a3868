//! The preview: one ephemeral change composing the content of every focused workspace.
//!
//! The preview is never patched. Each change to the focused set builds a new
//! tagged baseline/preview pair from scratch and abandons the previous pair,
//! so workspaces stay independent siblings of trunk and only the preview ever
//! looks like a merge.

pub mod store;

pub use store::{FocusEntry, FocusStore};

use crate::errors::{Result, WeaveError};
use crate::jj::{Change, Jj};
use crate::repo::WeaveRepo;
use crate::utils::quote_expr;
use crate::workspace::{remote_baseline, OwnershipDetector, RemoteBaseline, WorkspaceManager};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Description tag of the composed preview change
pub const PREVIEW_TAG: &str = "[weave:preview]";
/// Description tag of the merge of pushed baselines under the preview
pub const BASELINE_TAG: &str = "[weave:baseline]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FocusOutcome {
    /// Nothing focused: the main checkout sits on a fresh change on trunk
    Cleared { abandoned: usize },
    Focused {
        workspaces: Vec<String>,
        preview: String,
        baseline: String,
        abandoned: usize,
    },
}

impl FocusOutcome {
    pub fn workspaces(&self) -> &[String] {
        match self {
            FocusOutcome::Cleared { .. } => &[],
            FocusOutcome::Focused { workspaces, .. } => workspaces,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusStatus {
    pub workspaces: Vec<String>,
    pub preview: Option<Change>,
    /// `None` when the preview sits directly on trunk
    pub baseline: Option<Change>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictResolved {
    pub file: String,
    pub kept: String,
    pub unfocused: Vec<String>,
    pub outcome: Option<FocusOutcome>,
}

struct Member {
    name: String,
    tip: Change,
    baseline: RemoteBaseline,
}

/// Order-preserving dedupe
fn unique(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|n| seen.insert(n.as_str()))
        .cloned()
        .collect()
}

pub struct FocusEngine<'a> {
    repo: &'a WeaveRepo,
    store: FocusStore,
}

impl<'a> FocusEngine<'a> {
    pub fn new(repo: &'a WeaveRepo) -> Self {
        Self {
            repo,
            store: FocusStore::new(repo.state_dir()),
        }
    }

    fn jj(&self) -> &Jj {
        self.repo.root_jj()
    }

    /// Currently focused workspaces, minus any that vanished from disk
    pub fn focused(&self) -> Result<Vec<String>> {
        self.store
            .get(self.repo.root(), |w| self.repo.workspace_exists(w))
    }

    fn tagged(&self, tag: &str) -> Result<Vec<Change>> {
        self.jj()
            .log(&format!("description(substring:{})", quote_expr(tag)))
    }

    /// Rebuild the preview so it composes exactly `workspaces`
    pub fn update_focus(&self, workspaces: &[String]) -> Result<FocusOutcome> {
        let jj = self.jj();
        let old_previews = self.tagged(PREVIEW_TAG)?;
        let old_baselines = self.tagged(BASELINE_TAG)?;
        let old: Vec<String> = old_previews
            .iter()
            .chain(old_baselines.iter())
            .map(|c| c.commit_id.clone())
            .collect();

        let requested = unique(workspaces);
        if requested.is_empty() {
            jj.new_change(&[jj.trunk()], None)?;
            jj.abandon(&old)?;
            self.store.remove(self.repo.root())?;
            info!("Cleared focus, abandoned {} preview commit(s)", old.len());
            return Ok(FocusOutcome::Cleared {
                abandoned: old.len(),
            });
        }

        let included: Vec<String> = requested
            .iter()
            .filter(|w| self.repo.workspace_exists(w))
            .cloned()
            .collect();
        if included.is_empty() {
            return Err(WeaveError::WorkspaceNotFound(requested.join(", ")));
        }

        for workspace in &included {
            self.repo.workspace_jj(workspace).snapshot()?;
        }

        let sentinel = self.repo.unassigned().to_string();
        let mut names = Vec::with_capacity(included.len() + 1);
        if self.repo.workspace_exists(&sentinel) && !included.contains(&sentinel) {
            names.push(sentinel);
        }
        names.extend(included.iter().cloned());

        let mut members = Vec::with_capacity(names.len());
        for name in names {
            let tip = jj.resolve_single(&Jj::workspace_tip(&name))?;
            let (_, baseline) = remote_baseline(jj, &name)?;
            members.push(Member {
                name,
                tip,
                baseline,
            });
        }

        let base = self.build_baseline(&members, &old)?;
        jj.new_change(&[base.clone()], Some(PREVIEW_TAG))?;
        let preview = jj.resolve_single("@")?;
        debug!("New preview {} on {}", preview.short_id(), base);

        for member in &members {
            let paths: Vec<String> = jj
                .diff_summary(&member.baseline.revset(jj), &member.tip.commit_id)?
                .into_iter()
                .map(|c| c.path)
                .collect();
            if paths.is_empty() {
                continue;
            }
            debug!("Composing {} file(s) from {}", paths.len(), member.name);
            jj.restore(&member.tip.commit_id, &preview.change_id, &paths)?;
        }

        jj.abandon(&old)?;
        self.store.set(self.repo.root(), &included)?;
        info!("Focused {}", included.join(", "));

        Ok(FocusOutcome::Focused {
            workspaces: included,
            preview: preview.change_id,
            baseline: base,
            abandoned: old.len(),
        })
    }

    /// Trunk when nothing has been pushed, else a new tagged merge of the distinct baselines
    fn build_baseline(&self, members: &[Member], old: &[String]) -> Result<String> {
        let jj = self.jj();
        if members
            .iter()
            .all(|m| m.baseline == RemoteBaseline::Trunk)
        {
            return Ok(jj.trunk());
        }

        let parents = unique(
            &members
                .iter()
                .map(|m| m.baseline.revset(jj))
                .collect::<Vec<_>>(),
        );
        jj.new_change_no_edit(&parents, Some(BASELINE_TAG))?;

        self.tagged(BASELINE_TAG)?
            .into_iter()
            .find(|c| !old.contains(&c.commit_id))
            .map(|c| c.commit_id)
            .ok_or_else(|| WeaveError::invalid_state("Baseline commit vanished after creation"))
    }

    fn check_ownership(&self, workspaces: &[String]) -> Result<()> {
        let conflicts = OwnershipDetector::new(self.repo).conflicts(workspaces)?;
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(WeaveError::Conflict { files: conflicts })
        }
    }

    /// Focus `workspaces` in addition to the current set
    pub fn focus_add(&self, workspaces: &[String]) -> Result<FocusOutcome> {
        let mut target = self.focused()?;
        target.extend(workspaces.iter().cloned());
        let target: Vec<String> = unique(&target)
            .into_iter()
            .filter(|w| self.repo.workspace_exists(w))
            .collect();
        if target.is_empty() {
            return Err(WeaveError::WorkspaceNotFound(workspaces.join(", ")));
        }
        self.check_ownership(&target)?;
        self.update_focus(&target)
    }

    /// Focus every agent workspace
    pub fn focus_all(&self) -> Result<FocusOutcome> {
        let all = WorkspaceManager::new(self.repo).agent_workspaces()?;
        if all.is_empty() {
            return Err(WeaveError::not_found("No workspaces to focus"));
        }
        self.check_ownership(&all)?;
        self.update_focus(&all)
    }

    pub fn focus_only(&self, workspace: &str) -> Result<FocusOutcome> {
        if !self.repo.workspace_exists(workspace) {
            return Err(WeaveError::WorkspaceNotFound(workspace.to_string()));
        }
        self.update_focus(&[workspace.to_string()])
    }

    /// Focus a single workspace and hand back its checkout path for an editor
    pub fn focus_edit(&self, workspace: &str) -> Result<(FocusOutcome, PathBuf)> {
        let outcome = self.focus_only(workspace)?;
        Ok((outcome, self.repo.workspace_path(workspace)))
    }

    pub fn focus_remove(&self, workspaces: &[String]) -> Result<FocusOutcome> {
        let remaining: Vec<String> = self
            .focused()?
            .into_iter()
            .filter(|w| !workspaces.contains(w))
            .collect();
        self.update_focus(&remaining)
    }

    pub fn focus_none(&self) -> Result<FocusOutcome> {
        self.update_focus(&[])
    }

    /// Rebuild from the persisted set. Does nothing when nothing is focused.
    pub fn refresh(&self) -> Result<Option<FocusOutcome>> {
        let current = self.focused()?;
        if current.is_empty() {
            return Ok(None);
        }
        self.update_focus(&current).map(Some)
    }

    pub fn status(&self) -> Result<FocusStatus> {
        Ok(FocusStatus {
            workspaces: self.focused()?,
            preview: self.tagged(PREVIEW_TAG)?.into_iter().next(),
            baseline: self.tagged(BASELINE_TAG)?.into_iter().next(),
        })
    }

    /// Make `keep` the sole owner of `file` by unfocusing every other workspace touching it
    pub fn resolve_conflict(&self, file: &str, keep: &str) -> Result<ConflictResolved> {
        if !self.repo.workspace_exists(keep) {
            return Err(WeaveError::WorkspaceNotFound(keep.to_string()));
        }
        let mut candidates = self.focused()?;
        candidates.push(keep.to_string());
        let candidates = unique(&candidates);

        let owners = OwnershipDetector::new(self.repo).owners_of(file, &candidates)?;
        if !owners.iter().any(|o| o == keep) {
            return Err(WeaveError::invalid_input(format!(
                "Workspace '{keep}' does not modify {file}"
            )));
        }

        let others: Vec<String> = owners.into_iter().filter(|o| o != keep).collect();
        let outcome = if others.is_empty() {
            None
        } else {
            info!("Unfocusing {} so {} owns {}", others.join(", "), keep, file);
            Some(self.focus_remove(&others)?)
        };

        Ok(ConflictResolved {
            file: file.to_string(),
            kept: keep.to_string(),
            unfocused: others,
            outcome,
        })
    }
}
