use super::status::{parse_status, WorkingCopyStatus};
use super::template::{
    join_bookmarks, parse_bookmark_refs, parse_changes, parse_diff_summary, parse_workspace_list,
    Bookmark, Change, FileChange, WorkspaceEntry, BOOKMARK_TEMPLATE, CHANGE_TEMPLATE,
};
use super::{CommandOutput, CommandRunner};
use crate::config::Settings;
use crate::errors::{Result, WeaveError};
use crate::utils::quote_expr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which revisions a rebase moves along with the named one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseMode {
    /// The whole branch: the revision, its ancestors not on the destination, and descendants
    Branch,
    /// The revision and its descendants
    Source,
    /// Only the revision itself
    Revisions,
}

impl RebaseMode {
    fn flag(&self) -> &'static str {
        match self {
            RebaseMode::Branch => "-b",
            RebaseMode::Source => "-s",
            RebaseMode::Revisions => "-r",
        }
    }
}

/// Typed front end over a `CommandRunner`, bound to one working directory
#[derive(Clone)]
pub struct Jj {
    runner: Arc<dyn CommandRunner>,
    cwd: PathBuf,
    trunk_branch: String,
    remote: String,
    git_export: bool,
}

impl std::fmt::Debug for Jj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jj")
            .field("cwd", &self.cwd)
            .field("trunk_branch", &self.trunk_branch)
            .field("remote", &self.remote)
            .finish()
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn is_simple_symbol(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'))
        && !name.starts_with('.')
        && !name.contains("..")
}

/// Quote a bookmark or workspace name for a revset when it is not a plain symbol
pub fn revset_symbol(name: &str) -> String {
    if is_simple_symbol(name) {
        name.to_string()
    } else {
        quote_expr(name)
    }
}

/// The id prefix jj names in "Change ID prefix `ab` is ambiguous"
fn ambiguous_prefix(stderr: &str) -> Option<&str> {
    let start = stderr.find('`')? + 1;
    let len = stderr[start..].find('`')?;
    Some(&stderr[start..start + len])
}

/// Fileset matching exactly one repository-relative path
pub fn exact_file(path: &str) -> String {
    format!("root-file:{}", quote_expr(path))
}

impl Jj {
    pub fn new<P: Into<PathBuf>>(runner: Arc<dyn CommandRunner>, cwd: P, settings: &Settings) -> Self {
        Self {
            runner,
            cwd: cwd.into(),
            trunk_branch: settings.trunk.branch.clone(),
            remote: settings.trunk.remote.clone(),
            git_export: settings.jj.git_export,
        }
    }

    /// Same backend, different working directory (another workspace)
    pub fn in_dir(&self, cwd: &Path) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            ..self.clone()
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn trunk_branch(&self) -> &str {
        &self.trunk_branch
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Revset for trunk as published on the remote
    pub fn trunk(&self) -> String {
        self.remote_ref(&self.trunk_branch)
    }

    /// Revset for `name` on the configured remote
    pub fn remote_ref(&self, name: &str) -> String {
        format!("{}@{}", revset_symbol(name), revset_symbol(&self.remote))
    }

    /// Revset for the working-copy commit of workspace `name`
    pub fn workspace_tip(name: &str) -> String {
        format!("{}@", revset_symbol(name))
    }

    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.runner.run(&owned(args), &self.cwd)
    }

    /// Run with the immutability guard lifted for this invocation only
    pub fn run_ignoring_immutable(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut full = vec!["--ignore-immutable".to_string()];
        full.extend(owned(args));
        self.mutate(full)
    }

    fn mutate(&self, args: Vec<String>) -> Result<CommandOutput> {
        let output = self.runner.run(&args, &self.cwd)?;
        if self.git_export {
            if let Err(e) = self.runner.run(&owned(&["git", "export"]), &self.cwd) {
                warn!("Failed to export to the git mirror: {}", e);
            }
        }
        Ok(output)
    }

    fn mutate_args(&self, args: &[&str], ignore_immutable: bool) -> Result<CommandOutput> {
        if ignore_immutable {
            self.run_ignoring_immutable(args)
        } else {
            self.mutate(owned(args))
        }
    }

    /// Changes in `revset`, newest first
    pub fn log(&self, revset: &str) -> Result<Vec<Change>> {
        let out = self.run(&["log", "-r", revset, "--no-graph", "-T", CHANGE_TEMPLATE])?;
        parse_changes(&out.stdout)
    }

    /// Changes in `revset`, oldest (closest to trunk) first
    pub fn log_reversed(&self, revset: &str) -> Result<Vec<Change>> {
        let out = self.run(&[
            "log",
            "-r",
            revset,
            "--reversed",
            "--no-graph",
            "-T",
            CHANGE_TEMPLATE,
        ])?;
        parse_changes(&out.stdout)
    }

    /// Resolve a revset that must name exactly one change
    pub fn resolve_single(&self, revset: &str) -> Result<Change> {
        let changes = match self.log(revset) {
            Ok(changes) => changes,
            Err(WeaveError::CommandFailed { stderr, .. }) => {
                let lower = stderr.to_lowercase();
                if lower.contains("ambiguous") {
                    let prefix = ambiguous_prefix(&stderr).unwrap_or(revset.trim());
                    return Err(WeaveError::AmbiguousRevision {
                        revision: revset.to_string(),
                        candidates: self.prefix_candidates(prefix)?,
                    });
                }
                if lower.contains("doesn't exist")
                    || lower.contains("does not exist")
                    || lower.contains("not found")
                    || lower.contains("failed to parse")
                {
                    return Err(WeaveError::InvalidRevision(revset.to_string()));
                }
                return Err(WeaveError::command_failed(format!("jj log -r {revset}"), stderr));
            }
            Err(other) => return Err(other),
        };

        if changes.len() > 1 {
            return Err(WeaveError::AmbiguousRevision {
                revision: revset.to_string(),
                candidates: changes.into_iter().map(|c| c.change_id).collect(),
            });
        }
        changes
            .into_iter()
            .next()
            .ok_or_else(|| WeaveError::InvalidRevision(revset.to_string()))
    }

    /// Change ids of every visible change whose change or commit id starts with `prefix`
    fn prefix_candidates(&self, prefix: &str) -> Result<Vec<String>> {
        let mut candidates: Vec<String> = Vec::new();
        for change in self.log("all()")? {
            if (change.change_id.starts_with(prefix) || change.commit_id.starts_with(prefix))
                && !candidates.contains(&change.change_id)
            {
                candidates.push(change.change_id);
            }
        }
        Ok(candidates)
    }

    pub fn full_description(&self, rev: &str) -> Result<String> {
        let out = self.run(&["log", "-r", rev, "--no-graph", "-T", "description"])?;
        Ok(out.stdout.trim_end().to_string())
    }

    /// Create a change on top of `parents` and move the working copy onto it
    pub fn new_change(&self, parents: &[String], message: Option<&str>) -> Result<()> {
        self.new_change_inner(parents, message, false)
    }

    /// Create a change without moving the working copy
    pub fn new_change_no_edit(&self, parents: &[String], message: Option<&str>) -> Result<()> {
        self.new_change_inner(parents, message, true)
    }

    fn new_change_inner(&self, parents: &[String], message: Option<&str>, no_edit: bool) -> Result<()> {
        let mut args = vec!["new".to_string()];
        args.extend(parents.iter().cloned());
        if let Some(message) = message {
            args.push("-m".to_string());
            args.push(message.to_string());
        }
        if no_edit {
            args.push("--no-edit".to_string());
        }
        self.mutate(args).map(|_| ())
    }

    pub fn describe(&self, rev: &str, message: &str, ignore_immutable: bool) -> Result<()> {
        self.mutate_args(&["describe", rev, "-m", message], ignore_immutable)
            .map(|_| ())
    }

    /// Copy the content of `paths` from `from` into `into`. Never touches parentage.
    pub fn restore(&self, from: &str, into: &str, paths: &[String]) -> Result<()> {
        let mut args = owned(&["restore", "--from", from, "--into", into]);
        args.extend(paths.iter().map(|p| exact_file(p)));
        self.mutate(args).map(|_| ())
    }

    pub fn rebase(&self, mode: RebaseMode, rev: &str, destination: &str) -> Result<()> {
        self.mutate(owned(&["rebase", mode.flag(), rev, "-d", destination]))
            .map(|_| ())
    }

    pub fn abandon(&self, revs: &[String]) -> Result<()> {
        if revs.is_empty() {
            return Ok(());
        }
        let mut args = vec!["abandon".to_string()];
        args.extend(revs.iter().cloned());
        self.mutate(args).map(|_| ())
    }

    /// Fold `rev` into its parent, keeping the parent's description
    pub fn squash_into_parent(&self, rev: &str, ignore_immutable: bool) -> Result<()> {
        self.mutate_args(
            &["squash", "-r", rev, "--use-destination-message"],
            ignore_immutable,
        )
        .map(|_| ())
    }

    /// Move `paths` (all changes when empty) from `from` into `into`
    pub fn squash_paths(
        &self,
        from: &str,
        into: &str,
        paths: &[String],
        ignore_immutable: bool,
    ) -> Result<()> {
        let mut args = owned(&["squash", "--from", from, "--into", into, "--use-destination-message"]);
        args.extend(paths.iter().map(|p| exact_file(p)));
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.mutate_args(&refs, ignore_immutable).map(|_| ())
    }

    /// Split `paths` of `rev` into a first change described by `message`
    pub fn split(&self, rev: &str, message: &str, paths: &[String]) -> Result<()> {
        let mut args = owned(&["split", "-r", rev, "-m", message]);
        args.extend(paths.iter().map(|p| exact_file(p)));
        self.mutate(args).map(|_| ())
    }

    pub fn diff_summary(&self, from: &str, to: &str) -> Result<Vec<FileChange>> {
        let out = self.run(&["diff", "--summary", "--from", from, "--to", to])?;
        Ok(parse_diff_summary(&out.stdout))
    }

    /// Status of the working copy in `cwd`. Running it snapshots pending edits.
    pub fn status(&self) -> Result<WorkingCopyStatus> {
        let out = self.run(&["status"])?;
        Ok(parse_status(&format!("{}\n{}", out.stdout, out.stderr)))
    }

    /// Force-capture the edits of the workspace in `cwd`
    pub fn snapshot(&self) -> Result<()> {
        match self.run(&["status"]) {
            Ok(_) => Ok(()),
            Err(WeaveError::CommandFailed { stderr, .. }) if stderr.contains("stale") => {
                debug!("Workspace at {} is stale, updating", self.cwd.display());
                self.run(&["workspace", "update-stale"])?;
                self.run(&["status"]).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    /// Local bookmarks joined with their refs on the configured remote
    pub fn bookmarks(&self) -> Result<Vec<Bookmark>> {
        let out = self.run(&["bookmark", "list", "--all-remotes", "-T", BOOKMARK_TEMPLATE])?;
        Ok(join_bookmarks(parse_bookmark_refs(&out.stdout)?, &self.remote))
    }

    pub fn bookmark(&self, name: &str) -> Result<Option<Bookmark>> {
        Ok(self.bookmarks()?.into_iter().find(|b| b.name == name))
    }

    pub fn bookmark_set(&self, name: &str, rev: &str, allow_backwards: bool) -> Result<()> {
        let mut args = owned(&["bookmark", "set", name, "-r", rev]);
        if allow_backwards {
            args.push("--allow-backwards".to_string());
        }
        self.mutate(args).map(|_| ())
    }

    pub fn bookmark_delete(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let mut args = owned(&["bookmark", "delete"]);
        args.extend(names.iter().cloned());
        self.mutate(args).map(|_| ())
    }

    /// Start tracking `name` on the remote, creating the local bookmark from it
    pub fn bookmark_track(&self, name: &str) -> Result<()> {
        let remote_ref = format!("{}@{}", name, self.remote);
        self.mutate(owned(&["bookmark", "track", &remote_ref]))
            .map(|_| ())
    }

    pub fn fetch(&self) -> Result<()> {
        self.mutate(owned(&["git", "fetch", "--remote", &self.remote]))
            .map(|_| ())
    }

    pub fn push_bookmark(&self, name: &str) -> Result<()> {
        self.mutate(owned(&[
            "--config",
            "git.push-new-bookmarks=true",
            "git",
            "push",
            "--remote",
            &self.remote,
            "--bookmark",
            name,
        ]))
        .map(|_| ())
    }

    /// Create a workspace whose working copy is a new change on top of `rev`
    pub fn workspace_add(&self, name: &str, path: &Path, rev: &str) -> Result<()> {
        let path = path.to_string_lossy().to_string();
        self.mutate(owned(&["workspace", "add", "--name", name, "-r", rev, &path]))
            .map(|_| ())
    }

    pub fn workspace_forget(&self, name: &str) -> Result<()> {
        self.mutate(owned(&["workspace", "forget", name])).map(|_| ())
    }

    pub fn workspace_list(&self) -> Result<Vec<WorkspaceEntry>> {
        let out = self.run(&["workspace", "list"])?;
        Ok(parse_workspace_list(&out.stdout))
    }

    pub fn remote_url(&self) -> Result<Option<String>> {
        let out = self.run(&["git", "remote", "list"])?;
        Ok(out.stdout.lines().find_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(name), Some(url)) if name == self.remote => Some(url.to_string()),
                _ => None,
            }
        }))
    }
}
