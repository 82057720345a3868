use super::StackEngine;
use crate::errors::{Result, WeaveError};
use crate::jj::Jj;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct SplitResult {
    pub revision: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModifyResult {
    pub change_id: String,
    pub described: bool,
    pub absorbed_working_copy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SquashResult {
    pub absorbed: String,
    pub into: String,
    pub untracked: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignResult {
    pub workspace: String,
    pub files: Vec<String>,
}

fn missing_files(requested: &[String], available: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|f| !available.contains(f))
        .cloned()
        .collect()
}

impl<'a> StackEngine<'a> {
    fn changed_paths(&self, from: &str, to: &str) -> Result<Vec<String>> {
        Ok(self
            .jj()
            .diff_summary(from, to)?
            .into_iter()
            .map(|c| c.path)
            .collect())
    }

    /// Move `files` of `revision` into a new change before it, described by `message`
    pub fn split(&self, revision: &str, message: &str, files: &[String]) -> Result<SplitResult> {
        if files.is_empty() {
            return Err(WeaveError::invalid_input("Name at least one file to split out"));
        }
        let jj = self.jj();
        let change = jj.resolve_single(revision)?;
        // `x-` of a merge is every parent, which would diff against the wrong base
        if change.parents.len() != 1 {
            return Err(WeaveError::invalid_state(format!(
                "{} has {} parents; split needs exactly one",
                change.short_id(),
                change.parents.len()
            )));
        }
        let touched = self.changed_paths(&format!("{}-", change.commit_id), &change.commit_id)?;
        let missing = missing_files(files, &touched);
        if !missing.is_empty() {
            return Err(WeaveError::invalid_input(format!(
                "{} does not modify: {}",
                change.short_id(),
                missing.join(", ")
            )));
        }
        if missing_files(&touched, files).is_empty() {
            return Err(WeaveError::invalid_input(
                "Splitting out every file would leave an empty change",
            ));
        }

        jj.split(&change.change_id, message, files)?;
        info!("Split {} file(s) out of {}", files.len(), change.short_id());
        Ok(SplitResult {
            revision: change.change_id,
            files: files.to_vec(),
        })
    }

    /// Reword `revision` and/or fold the working copy into it. `force` rewrites pushed history.
    pub fn modify(
        &self,
        revision: Option<&str>,
        message: Option<&str>,
        include_working_copy: bool,
        force: bool,
    ) -> Result<ModifyResult> {
        if message.is_none() && !include_working_copy {
            return Err(WeaveError::invalid_input(
                "Nothing to modify: pass a message or --include-working-copy",
            ));
        }
        let jj = self.jj();
        let target = jj.resolve_single(revision.unwrap_or("@"))?;
        let at = jj.resolve_single("@")?;

        let absorb = include_working_copy && at.change_id != target.change_id;
        if absorb {
            jj.squash_paths("@", &target.change_id, &[], force)?;
        }
        if let Some(message) = message {
            jj.describe(&target.change_id, message, force)?;
        }

        Ok(ModifyResult {
            change_id: target.change_id,
            described: message.is_some(),
            absorbed_working_copy: absorb,
        })
    }

    /// Fold `revision` into its parent and stop tracking the bookmarks it carried
    pub fn squash(&self, revision: Option<&str>) -> Result<SquashResult> {
        let jj = self.jj();
        let change = jj.resolve_single(revision.unwrap_or("@"))?;
        if change.parents.len() != 1 {
            return Err(WeaveError::invalid_state(format!(
                "{} has {} parents; squash needs exactly one",
                change.short_id(),
                change.parents.len()
            )));
        }
        let parent = jj.resolve_single(&format!("{}-", change.commit_id))?;

        jj.squash_into_parent(&change.change_id, false)?;

        let mut untracked = Vec::new();
        for bookmark in &change.bookmarks {
            if self.tracking.untrack(bookmark)? {
                untracked.push(bookmark.clone());
            }
        }
        info!("Squashed {} into {}", change.short_id(), parent.short_id());
        Ok(SquashResult {
            absorbed: change.change_id,
            into: parent.change_id,
            untracked,
        })
    }

    /// Move `files` from the unassigned workspace into `workspace`
    pub fn assign(&self, files: &[String], workspace: &str) -> Result<AssignResult> {
        if files.is_empty() {
            return Err(WeaveError::invalid_input("Name at least one file to assign"));
        }
        let sentinel = self.repo.unassigned();
        if workspace == sentinel {
            return Err(WeaveError::invalid_input(
                "Files are already in the unassigned workspace",
            ));
        }
        if !self.repo.workspace_exists(workspace) {
            return Err(WeaveError::WorkspaceNotFound(workspace.to_string()));
        }
        if !self.repo.workspace_exists(sentinel) {
            return Err(WeaveError::WorkspaceNotFound(sentinel.to_string()));
        }

        self.repo.workspace_jj(sentinel).snapshot()?;
        let jj = self.repo.root_jj();
        let from = Jj::workspace_tip(sentinel);
        let available = self.changed_paths(&jj.trunk(), &from)?;
        let missing = missing_files(files, &available);
        if !missing.is_empty() {
            return Err(WeaveError::invalid_input(format!(
                "Not pending in {sentinel}: {}",
                missing.join(", ")
            )));
        }

        jj.squash_paths(&from, &Jj::workspace_tip(workspace), files, false)?;
        info!("Assigned {} file(s) to {}", files.len(), workspace);
        Ok(AssignResult {
            workspace: workspace.to_string(),
            files: files.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jj::fake::change_line;
    use crate::repo::test_support::TestRepo;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_validates_files() {
        let t = TestRepo::new();
        t.runner.on(
            &["log", "-r", "@"],
            &change_line("wc", &["p"], &[], false, false, "Mixed"),
        );
        t.runner.on(
            &["--from", "commit-wc-", "--to", "commit-wc"],
            "M a.rs\nM b.rs\n",
        );
        let engine = StackEngine::new(&t.repo);

        assert!(matches!(
            engine.split("@", "Part", &names(&["c.rs"])),
            Err(WeaveError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.split("@", "Part", &names(&["a.rs", "b.rs"])),
            Err(WeaveError::InvalidInput(_))
        ));
        let result = engine.split("@", "Part", &names(&["a.rs"])).unwrap();
        assert_eq!(result.revision, "wc");
        assert_eq!(
            t.runner.calls_to("split"),
            vec![names(&["split", "-r", "wc", "-m", "Part", "root-file:\"a.rs\""])]
        );
    }

    #[test]
    fn test_split_rejects_merge_commit() {
        let t = TestRepo::new();
        t.runner.on(
            &["log", "-r", "@"],
            &change_line("merge", &["p1", "p2"], &[], false, false, "Merge"),
        );

        let err = StackEngine::new(&t.repo)
            .split("@", "Part", &names(&["a.rs"]))
            .unwrap_err();

        assert!(matches!(err, WeaveError::InvalidState(_)));
        assert!(t.runner.calls_to("diff").is_empty());
        assert!(t.runner.calls_to("split").is_empty());
    }

    #[test]
    fn test_modify_pushed_change_with_force() {
        let t = TestRepo::new();
        t.runner.on(
            &["log", "-r", "feat"],
            &change_line("kf", &["p"], &["feat"], false, false, "Old"),
        );
        t.runner.on(
            &["log", "-r", "@"],
            &change_line("wc", &["commit-kf"], &[], false, false, ""),
        );
        let result = StackEngine::new(&t.repo)
            .modify(Some("feat"), Some("New title"), true, true)
            .unwrap();

        assert!(result.absorbed_working_copy);
        let calls = t.runner.calls();
        assert!(calls.contains(&names(&[
            "--ignore-immutable",
            "squash",
            "--from",
            "@",
            "--into",
            "kf",
            "--use-destination-message"
        ])));
        assert!(calls.contains(&names(&["--ignore-immutable", "describe", "kf", "-m", "New title"])));
    }

    #[test]
    fn test_modify_requires_something_to_do() {
        let t = TestRepo::new();
        assert!(matches!(
            StackEngine::new(&t.repo).modify(None, None, false, false),
            Err(WeaveError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_squash_untracks_absorbed_bookmarks() {
        let t = TestRepo::new();
        t.runner.on(
            &["log", "-r", "top"],
            &change_line("kt", &["commit-kp"], &["feat-top"], false, false, "Top"),
        );
        t.runner.on(
            &["log", "-r", "commit-kt-"],
            &change_line("kp", &["trunk"], &["feat-base"], false, false, "Base"),
        );
        let engine = StackEngine::new(&t.repo);
        engine.tracking().track("feat-top").unwrap();
        engine.tracking().track("feat-base").unwrap();

        let result = engine.squash(Some("top")).unwrap();

        assert_eq!(result.into, "kp");
        assert_eq!(result.untracked, vec!["feat-top"]);
        assert_eq!(engine.tracking().tracked_names().unwrap(), vec!["feat-base"]);
        assert_eq!(
            t.runner.calls_to("squash"),
            vec![names(&["squash", "-r", "kt", "--use-destination-message"])]
        );
    }

    #[test]
    fn test_squash_rejects_merge_commit() {
        let t = TestRepo::new();
        t.runner.on(
            &["log", "-r", "@"],
            &change_line("m", &["p1", "p2"], &[], false, false, "Merge"),
        );
        assert!(matches!(
            StackEngine::new(&t.repo).squash(None),
            Err(WeaveError::InvalidState(_))
        ));
    }

    #[test]
    fn test_assign_moves_pending_files() {
        let t = TestRepo::new();
        t.create_workspace_dir("unassigned");
        t.create_workspace_dir("agent-a");
        t.runner.on(
            &["--from", "main@origin", "--to", "unassigned@"],
            "M notes.md\nA scratch.rs\n",
        );
        let engine = StackEngine::new(&t.repo);

        assert!(matches!(
            engine.assign(&names(&["other.rs"]), "agent-a"),
            Err(WeaveError::InvalidInput(_))
        ));
        let result = engine.assign(&names(&["scratch.rs"]), "agent-a").unwrap();

        assert_eq!(result.files, vec!["scratch.rs"]);
        assert_eq!(
            t.runner.calls_to("squash"),
            vec![names(&[
                "squash",
                "--from",
                "unassigned@",
                "--into",
                "agent-a@",
                "--use-destination-message",
                "root-file:\"scratch.rs\""
            ])]
        );
    }

    #[test]
    fn test_assign_to_missing_workspace() {
        let t = TestRepo::new();
        t.create_workspace_dir("unassigned");
        assert!(matches!(
            StackEngine::new(&t.repo).assign(&names(&["a"]), "ghost"),
            Err(WeaveError::WorkspaceNotFound(_))
        ));
    }
}
