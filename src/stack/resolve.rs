//! Walks the conflicted commits a rebase left behind, one at a time.
//!
//! States: no session -> awaiting fix -> more remaining | stack clean. The
//! session file is the continuation: a process exit mid-resolution leaves it in
//! place and the next `resolve` call picks up from whatever the backend shows.

use crate::errors::{Result, WeaveError};
use crate::jj::{Change, Jj};
use crate::repo::WeaveRepo;
use crate::utils::atomic_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn default_scope() -> String {
    "@".to_string()
}

/// Where the user was before conflict resolution took over the working copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveSession {
    pub original_bookmark: Option<String>,
    /// A change that survives navigation: the working copy itself, or its
    /// parent when the working copy is discardable
    pub original_change_id: String,
    pub started_at: DateTime<Utc>,
    /// Revset whose trunk-relative range the rebase left conflicted
    #[serde(default = "default_scope")]
    pub scope: String,
}

impl ResolveSession {
    /// Revision to return to once the stack is clean
    pub fn return_target(&self) -> &str {
        self.original_bookmark
            .as_deref()
            .unwrap_or(&self.original_change_id)
    }

    /// Everything to rescan after each fix
    pub fn rescan_scope(&self) -> String {
        format!("({}) | {} | @", self.scope, self.original_change_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictInfo {
    pub change_id: String,
    pub description: String,
    pub bookmarks: Vec<String>,
    pub files: Vec<String>,
    /// Conflicted commits left including this one
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// Another conflicted commit is now checked out
    NextConflict(ConflictInfo),
    /// The stack is clean and the working copy is back where the user started
    ReturnedTo { target: String },
    /// Nothing is conflicted and no session was in progress
    StackClean,
}

pub struct ConflictResolver<'a> {
    repo: &'a WeaveRepo,
    session_file: PathBuf,
}

impl<'a> ConflictResolver<'a> {
    pub const SESSION_FILE: &'static str = "resolve-session.json";

    pub fn new(repo: &'a WeaveRepo) -> Self {
        Self {
            repo,
            session_file: repo.meta_dir().join(Self::SESSION_FILE),
        }
    }

    fn jj(&self) -> &Jj {
        self.repo.jj()
    }

    pub fn session_file(&self) -> &Path {
        &self.session_file
    }

    pub fn session(&self) -> Result<Option<ResolveSession>> {
        atomic_file::read_json(&self.session_file)
    }

    fn save_session(&self, session: &ResolveSession) -> Result<()> {
        if let Some(parent) = self.session_file.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_file::write_json(&self.session_file, session)
    }

    /// Conflicted commits between trunk and `scope`, deepest first
    pub fn conflicted(&self, scope: &str) -> Result<Vec<Change>> {
        let jj = self.jj();
        jj.log_reversed(&format!("(({})..({})) & conflicts()", jj.trunk(), scope))
    }

    /// Bookmark and change the working copy currently represents.
    /// An empty, undescribed working copy is abandoned by the backend as soon
    /// as it is left, so its single parent stands in for it.
    fn current_position(&self) -> Result<(Option<String>, String)> {
        let jj = self.jj();
        let at = jj.resolve_single("@")?;
        if let Some(bookmark) = at.bookmarks.first() {
            return Ok((Some(bookmark.clone()), at.change_id));
        }
        if at.empty && at.description.is_empty() {
            if let [parent] = jj.log("@-")?.as_slice() {
                return Ok((parent.bookmarks.first().cloned(), parent.change_id.clone()));
            }
        }
        Ok((None, at.change_id))
    }

    /// After a rebase: if anything in `scope` is conflicted, record where the
    /// user is, move onto the deepest conflict and describe it.
    pub fn begin(&self, scope: &str) -> Result<Option<ConflictInfo>> {
        let conflicts = self.conflicted(scope)?;
        let Some(root) = conflicts.first() else {
            return Ok(None);
        };

        match self.session()? {
            None => {
                let (original_bookmark, original_change_id) = self.current_position()?;
                self.save_session(&ResolveSession {
                    original_bookmark,
                    original_change_id,
                    started_at: Utc::now(),
                    scope: scope.to_string(),
                })?;
                info!("Started conflict resolution at {}", root.short_id());
            }
            Some(mut session) if session.scope != scope => {
                session.scope = format!("({}) | ({})", session.scope, scope);
                self.save_session(&session)?;
                debug!("Widened resolution scope to {}", session.scope);
            }
            Some(_) => {}
        }

        self.navigate(root, conflicts.len()).map(Some)
    }

    fn navigate(&self, change: &Change, remaining: usize) -> Result<ConflictInfo> {
        let jj = self.jj();
        jj.new_change(&[change.change_id.clone()], None)?;
        let status = jj.status()?;
        Ok(ConflictInfo {
            change_id: change.change_id.clone(),
            description: change.description.clone(),
            bookmarks: change.bookmarks.clone(),
            files: status.conflicted_files,
            remaining,
        })
    }

    /// Fold the fix into the conflicted commit, then move on or finish
    pub fn resolve(&self) -> Result<ResolveOutcome> {
        let jj = self.jj();
        let status = jj.status()?;

        if !status.parent_conflict_resolved {
            let parent_conflicted = jj.log("@-")?.iter().any(|c| c.conflict);
            return Err(if parent_conflicted {
                WeaveError::invalid_state(format!(
                    "Conflicts remain{}; fix the files first",
                    if status.conflicted_files.is_empty() {
                        String::new()
                    } else {
                        format!(" in {}", status.conflicted_files.join(", "))
                    }
                ))
            } else {
                WeaveError::invalid_state("Nothing to resolve: the parent commit has no conflicts")
            });
        }

        jj.squash_into_parent("@", false)?;

        let session = self.session()?;
        let scope = match &session {
            Some(s) => s.rescan_scope(),
            None => "@".to_string(),
        };
        let remaining = self.conflicted(&scope)?;

        if let Some(next) = remaining.first() {
            info!("{} conflicted commit(s) remain", remaining.len());
            return self
                .navigate(next, remaining.len())
                .map(ResolveOutcome::NextConflict);
        }

        match session {
            Some(session) => {
                let target = session.return_target().to_string();
                jj.new_change(&[target.clone()], None)?;
                atomic_file::remove(&self.session_file)?;
                info!("Conflict resolution finished, back on {}", target);
                Ok(ResolveOutcome::ReturnedTo { target })
            }
            None => Ok(ResolveOutcome::StackClean),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jj::fake::change_line;
    use crate::jj::status::RESOLVED_HINT;
    use crate::repo::test_support::TestRepo;

    const CONFLICTS_QUERY: &str = "((main@origin)..((feat-b | @) | top | @)) & conflicts()";

    fn conflicted_status(files: &[&str]) -> String {
        let mut out = String::from(
            "Working copy  (@) : zzz 111 (conflict) (empty) (no description set)\n\
             Warning: There are unresolved conflicts at these paths:\n",
        );
        for f in files {
            out.push_str(&format!("{f}    2-sided conflict\n"));
        }
        out
    }

    fn resolved_status() -> String {
        format!("Working copy changes:\nM file.txt\nHint: {RESOLVED_HINT}\n")
    }

    fn session(t: &TestRepo) -> ResolveSession {
        let s = ResolveSession {
            original_bookmark: Some("feat-b".to_string()),
            original_change_id: "top".to_string(),
            started_at: Utc::now(),
            scope: "feat-b | @".to_string(),
        };
        ConflictResolver::new(&t.repo).save_session(&s).unwrap();
        s
    }

    #[test]
    fn test_begin_records_session_and_checks_out_root() {
        let t = TestRepo::new();
        t.runner.on(
            &["log", "-r", "((main@origin)..(feat-a | feat-b | @)) & conflicts()"],
            &format!(
                "{}{}",
                change_line("c1", &["trunk"], &["feat-a"], true, false, "A"),
                change_line("c2", &["commit-c1"], &["feat-b"], true, false, "B")
            ),
        );
        t.runner.on(
            &["log", "-r", "@"],
            &change_line("top", &["commit-c2"], &[], false, true, ""),
        );
        t.runner.on(
            &["log", "-r", "@-"],
            &change_line("c2", &["commit-c1"], &["feat-b"], true, false, "B"),
        );
        t.runner.on(&["status"], &conflicted_status(&["src/lib.rs"]));

        let resolver = ConflictResolver::new(&t.repo);
        let info = resolver
            .begin("feat-a | feat-b | @")
            .unwrap()
            .unwrap();

        assert_eq!(info.change_id, "c1");
        assert_eq!(info.files, vec!["src/lib.rs"]);
        assert_eq!(info.remaining, 2);
        assert!(t.runner.calls().contains(&vec!["new".to_string(), "c1".to_string()]));
        let saved = resolver.session().unwrap().unwrap();
        assert_eq!(saved.original_bookmark.as_deref(), Some("feat-b"));
        // the empty working copy is abandoned by `jj new`, its parent is not
        assert_eq!(saved.original_change_id, "c2");
        assert_eq!(saved.scope, "feat-a | feat-b | @");
    }

    #[test]
    fn test_begin_keeps_described_working_copy() {
        let t = TestRepo::new();
        t.runner.on(
            &["log", "-r", "((main@origin)..(@)) & conflicts()"],
            &change_line("c1", &["trunk"], &[], true, false, "A"),
        );
        t.runner.on(
            &["log", "-r", "@"],
            &change_line("wip", &["commit-c1"], &[], false, false, "Work in progress"),
        );

        let resolver = ConflictResolver::new(&t.repo);
        resolver.begin("@").unwrap().unwrap();

        let saved = resolver.session().unwrap().unwrap();
        assert_eq!(saved.original_bookmark, None);
        assert_eq!(saved.original_change_id, "wip");
        assert!(t.runner.calls_to("log").iter().all(|c| c[2] != "@-"));
    }

    #[test]
    fn test_begin_widens_scope_of_running_session() {
        let t = TestRepo::new();
        session(&t);
        t.runner.on(
            &["log", "-r", "((main@origin)..(mutable())) & conflicts()"],
            &change_line("c9", &["trunk"], &["other"], true, false, "Other"),
        );

        let resolver = ConflictResolver::new(&t.repo);
        resolver.begin("mutable()").unwrap().unwrap();

        let saved = resolver.session().unwrap().unwrap();
        assert_eq!(saved.scope, "(feat-b | @) | (mutable())");
        assert_eq!(saved.original_change_id, "top");
    }

    #[test]
    fn test_rescan_covers_every_conflicted_stack() {
        let t = TestRepo::new();
        let query = "((main@origin)..((A | X | @) | ka | @)) & conflicts()";
        ConflictResolver::new(&t.repo)
            .save_session(&ResolveSession {
                original_bookmark: Some("A".to_string()),
                original_change_id: "ka".to_string(),
                started_at: Utc::now(),
                scope: "A | X | @".to_string(),
            })
            .unwrap();
        t.runner.on(&["status"], &resolved_status());
        t.runner.then(&["status"], &conflicted_status(&["x.txt"]));
        t.runner.then(&["status"], &resolved_status());
        t.runner.on(
            &["log", "-r", query],
            &change_line("kx", &["trunk"], &["X"], true, false, "X"),
        );
        t.runner.then(&["log", "-r", query], "");

        let resolver = ConflictResolver::new(&t.repo);
        match resolver.resolve().unwrap() {
            ResolveOutcome::NextConflict(info) => {
                assert_eq!(info.change_id, "kx");
                assert_eq!(info.bookmarks, vec!["X"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(resolver.session_file().exists());

        assert_eq!(
            resolver.resolve().unwrap(),
            ResolveOutcome::ReturnedTo {
                target: "A".to_string()
            }
        );
        assert!(!resolver.session_file().exists());
    }

    #[test]
    fn test_session_file_without_scope_still_loads() {
        let t = TestRepo::new();
        let resolver = ConflictResolver::new(&t.repo);
        fs::create_dir_all(t.repo.meta_dir()).unwrap();
        fs::write(
            resolver.session_file(),
            r#"{"originalBookmark":null,"originalChangeId":"abc","startedAt":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let session = resolver.session().unwrap().unwrap();
        assert_eq!(session.scope, "@");
        assert_eq!(session.rescan_scope(), "(@) | abc | @");
    }

    #[test]
    fn test_begin_without_conflicts_writes_nothing() {
        let t = TestRepo::new();
        let resolver = ConflictResolver::new(&t.repo);
        assert!(resolver.begin("@").unwrap().is_none());
        assert!(!resolver.session_file().exists());
    }

    #[test]
    fn test_two_conflicts_resolve_then_return() {
        let t = TestRepo::new();
        session(&t);
        t.runner.on(&["status"], &resolved_status());
        t.runner.then(&["status"], &conflicted_status(&["b.txt"]));
        t.runner.then(&["status"], &resolved_status());
        t.runner.on(
            &["log", "-r", CONFLICTS_QUERY],
            &change_line("c2", &["commit-c1"], &["feat-b"], true, false, "B"),
        );
        t.runner.then(&["log", "-r", CONFLICTS_QUERY], "");

        let resolver = ConflictResolver::new(&t.repo);
        match resolver.resolve().unwrap() {
            ResolveOutcome::NextConflict(info) => {
                assert_eq!(info.change_id, "c2");
                assert_eq!(info.files, vec!["b.txt"]);
                assert_eq!(info.remaining, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(resolver.session_file().exists());

        assert_eq!(
            resolver.resolve().unwrap(),
            ResolveOutcome::ReturnedTo {
                target: "feat-b".to_string()
            }
        );
        assert!(!resolver.session_file().exists());

        let squashes = t.runner.calls_to("squash");
        assert_eq!(squashes.len(), 2);
        assert_eq!(
            squashes[0],
            vec!["squash", "-r", "@", "--use-destination-message"]
        );
        let news = t.runner.calls_to("new");
        assert_eq!(news, vec![vec!["new", "c2"], vec!["new", "feat-b"]]);
    }

    #[test]
    fn test_unfixed_conflict_is_rejected() {
        let t = TestRepo::new();
        t.runner.on(&["status"], &conflicted_status(&["a.txt"]));
        t.runner.on(
            &["log", "-r", "@-"],
            &change_line("c1", &["trunk"], &[], true, false, "A"),
        );
        let err = ConflictResolver::new(&t.repo).resolve().unwrap_err();
        assert!(matches!(err, WeaveError::InvalidState(ref m) if m.contains("fix the files first")));
        assert!(t.runner.calls_to("squash").is_empty());
    }

    #[test]
    fn test_clean_parent_has_nothing_to_resolve() {
        let t = TestRepo::new();
        t.runner.on(
            &["log", "-r", "@-"],
            &change_line("c1", &["trunk"], &[], false, false, "A"),
        );
        let err = ConflictResolver::new(&t.repo).resolve().unwrap_err();
        assert!(matches!(err, WeaveError::InvalidState(ref m) if m.contains("Nothing to resolve")));
    }

    #[test]
    fn test_fix_without_session_reports_clean_stack() {
        let t = TestRepo::new();
        t.runner.on(&["status"], &resolved_status());
        assert_eq!(
            ConflictResolver::new(&t.repo).resolve().unwrap(),
            ResolveOutcome::StackClean
        );
    }
}
