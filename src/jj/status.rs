//! Parsing of human-oriented `jj status` output.

/// Emitted by the backend once the working copy no longer carries its parent's conflict
pub const RESOLVED_HINT: &str = "Conflict in parent commit has been resolved in working copy";

const CONFLICTS_HEADER: &str = "There are unresolved conflicts at these paths:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingCopyStatus {
    /// Paths listed under the unresolved-conflicts section
    pub conflicted_files: Vec<String>,
    /// The parent's conflict has been fixed in the working copy
    pub parent_conflict_resolved: bool,
}

pub fn parse_status(output: &str) -> WorkingCopyStatus {
    let mut status = WorkingCopyStatus {
        parent_conflict_resolved: output.contains(RESOLVED_HINT),
        ..Default::default()
    };

    let mut in_conflicts = false;
    for line in output.lines() {
        if line.contains(CONFLICTS_HEADER) {
            in_conflicts = true;
            continue;
        }
        if !in_conflicts {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || is_section_line(trimmed) {
            in_conflicts = false;
            continue;
        }
        status.conflicted_files.push(conflict_path(trimmed));
    }

    status
}

fn is_section_line(line: &str) -> bool {
    const SECTIONS: [&str; 7] = [
        "Working copy",
        "Parent commit",
        "Hint:",
        "Warning:",
        "The working copy",
        "Conflicted bookmarks",
        "Untracked paths",
    ];
    SECTIONS.iter().any(|s| line.starts_with(s))
}

/// `path/to/file    2-sided conflict` -> `path/to/file`
fn conflict_path(line: &str) -> String {
    if let Some(idx) = line.find("  ") {
        return line[..idx].trim().to_string();
    }
    match line.rsplit_once(' ') {
        Some((path, tail)) if tail == "conflict" || tail.ends_with("conflict") => {
            path.rsplit_once(' ')
                .map(|(p, _)| p.to_string())
                .unwrap_or_else(|| path.to_string())
        }
        _ => line.to_string(),
    }
}
