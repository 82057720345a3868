//! Templates handed to `jj ... -T` and parsers for the records they produce.
//!
//! Every record is one line of tab-separated fields. Free text (descriptions)
//! always comes last so tabs inside it survive `splitn`.

use crate::errors::{Result, WeaveError};
use serde::Serialize;

pub const CHANGE_TEMPLATE: &str = concat!(
    r#"change_id ++ "\t" ++ commit_id ++ "\t" ++ "#,
    r#"parents.map(|p| p.commit_id()).join(",") ++ "\t" ++ "#,
    r#"local_bookmarks.map(|b| b.name()).join(",") ++ "\t" ++ "#,
    r#"if(conflict, "1", "0") ++ "\t" ++ if(empty, "1", "0") ++ "\t" ++ "#,
    r#"description.first_line() ++ "\n""#
);

pub const BOOKMARK_TEMPLATE: &str = concat!(
    r#"name ++ "\t" ++ if(remote, remote, "") ++ "\t" ++ "#,
    r#"if(normal_target, normal_target.commit_id() ++ "\t" ++ normal_target.change_id() ++ "\t" ++ "#,
    r#"if(normal_target.empty(), "1", "0"), "\t\t") ++ "\t" ++ "#,
    r#"if(conflict, "1", "0") ++ "\n""#
);

/// One revision as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub change_id: String,
    pub commit_id: String,
    pub parents: Vec<String>,
    pub bookmarks: Vec<String>,
    pub conflict: bool,
    pub empty: bool,
    pub description: String,
}

impl Change {
    pub fn short_id(&self) -> &str {
        let end = self.change_id.len().min(12);
        &self.change_id[..end]
    }

    pub fn title(&self) -> &str {
        if self.description.is_empty() {
            "(no description set)"
        } else {
            &self.description
        }
    }
}

/// A local or remote bookmark ref as listed by `jj bookmark list --all-remotes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkRef {
    pub name: String,
    pub remote: Option<String>,
    pub target: Option<BookmarkTarget>,
    /// Several targets at once; `target` is then `None`
    pub conflict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkTarget {
    pub commit_id: String,
    pub change_id: String,
    pub empty: bool,
}

/// A bookmark joined with its counterpart on the configured remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    pub name: String,
    pub local: Option<BookmarkTarget>,
    pub remote: Option<BookmarkTarget>,
    /// The local bookmark points at several commits
    pub conflicted: bool,
}

impl Bookmark {
    pub fn is_pushed(&self) -> bool {
        self.remote.is_some()
    }

    /// Local target differs from what the remote has
    pub fn is_ahead(&self) -> bool {
        match (&self.local, &self.remote) {
            (Some(local), Some(remote)) => local.commit_id != remote.commit_id,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            FileStatus::Added => "A",
            FileStatus::Modified => "M",
            FileStatus::Deleted => "D",
            FileStatus::Renamed => "R",
            FileStatus::Copied => "C",
        };
        f.write_str(code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub status: FileStatus,
    pub path: String,
}

/// A line of `jj workspace list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceEntry {
    pub name: String,
    pub change_id: String,
}

fn malformed(kind: &str, line: &str) -> WeaveError {
    WeaveError::command_failed(
        format!("parse {kind}"),
        format!("Unexpected backend output: {line:?}"),
    )
}

fn split_list(field: &str) -> Vec<String> {
    field
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_changes(output: &str) -> Result<Vec<Change>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.splitn(7, '\t').collect();
            if fields.len() != 7 {
                return Err(malformed("change", line));
            }
            Ok(Change {
                change_id: fields[0].to_string(),
                commit_id: fields[1].to_string(),
                parents: split_list(fields[2]),
                bookmarks: split_list(fields[3]),
                conflict: fields[4] == "1",
                empty: fields[5] == "1",
                description: fields[6].to_string(),
            })
        })
        .collect()
}

pub fn parse_bookmark_refs(output: &str) -> Result<Vec<BookmarkRef>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 5 && fields.len() != 6 {
                return Err(malformed("bookmark", line));
            }
            let target = if fields[2].is_empty() {
                None
            } else {
                Some(BookmarkTarget {
                    commit_id: fields[2].to_string(),
                    change_id: fields[3].to_string(),
                    empty: fields[4] == "1",
                })
            };
            Ok(BookmarkRef {
                name: fields[0].to_string(),
                remote: Some(fields[1]).filter(|r| !r.is_empty()).map(str::to_string),
                target,
                conflict: fields.get(5) == Some(&"1"),
            })
        })
        .collect()
}

/// Join local refs with their refs on `remote`, in first-seen order
pub fn join_bookmarks(refs: Vec<BookmarkRef>, remote: &str) -> Vec<Bookmark> {
    let mut bookmarks: Vec<Bookmark> = Vec::new();
    for r in refs {
        let idx = match bookmarks.iter().position(|b| b.name == r.name) {
            Some(idx) => idx,
            None => {
                bookmarks.push(Bookmark {
                    name: r.name.clone(),
                    local: None,
                    remote: None,
                    conflicted: false,
                });
                bookmarks.len() - 1
            }
        };
        match r.remote.as_deref() {
            None => {
                bookmarks[idx].local = r.target;
                bookmarks[idx].conflicted = r.conflict;
            }
            Some(name) if name == remote => bookmarks[idx].remote = r.target,
            Some(_) => {}
        }
    }
    bookmarks.retain(|b| b.local.is_some() || b.remote.is_some() || b.conflicted);
    bookmarks
}

/// Parse `jj diff --summary`, expanding rename braces (`src/{a.rs => b.rs}`) into both paths
pub fn parse_diff_summary(output: &str) -> Vec<FileChange> {
    let mut changes = Vec::new();
    for line in output.lines() {
        let line = line.trim_end();
        let Some((code, rest)) = line.split_once(' ') else {
            continue;
        };
        let status = match code {
            "A" => FileStatus::Added,
            "M" => FileStatus::Modified,
            "D" => FileStatus::Deleted,
            "R" => FileStatus::Renamed,
            "C" => FileStatus::Copied,
            _ => continue,
        };
        let rest = rest.trim();
        match status {
            FileStatus::Renamed | FileStatus::Copied => {
                for path in expand_rename(rest) {
                    changes.push(FileChange { status, path });
                }
            }
            _ => changes.push(FileChange {
                status,
                path: rest.to_string(),
            }),
        }
    }
    changes
}

fn expand_rename(spec: &str) -> Vec<String> {
    if let (Some(open), Some(close)) = (spec.find('{'), spec.rfind('}')) {
        let prefix = &spec[..open];
        let suffix = &spec[close + 1..];
        if let Some((old, new)) = spec[open + 1..close].split_once(" => ") {
            let join = |middle: &str| format!("{prefix}{middle}{suffix}").replace("//", "/");
            return vec![join(old), join(new)];
        }
    }
    if let Some((old, new)) = spec.split_once(" => ") {
        return vec![old.to_string(), new.to_string()];
    }
    vec![spec.to_string()]
}

pub fn parse_workspace_list(output: &str) -> Vec<WorkspaceEntry> {
    output
        .lines()
        .filter_map(|line| {
            let (name, rest) = line.split_once(": ")?;
            let change_id = rest.split_whitespace().next().unwrap_or_default();
            Some(WorkspaceEntry {
                name: name.trim().to_string(),
                change_id: change_id.to_string(),
            })
        })
        .collect()
}
