use crate::errors::{FileOwnership, Result};
use crate::jj::Jj;
use crate::repo::WeaveRepo;
use std::collections::BTreeMap;

/// Works out which files each workspace touches relative to trunk.
///
/// Diffs are recomputed on every call; nothing is cached between commands.
pub struct OwnershipDetector<'a> {
    repo: &'a WeaveRepo,
}

impl<'a> OwnershipDetector<'a> {
    pub fn new(repo: &'a WeaveRepo) -> Self {
        Self { repo }
    }

    /// Paths `workspace` changes relative to trunk
    pub fn files_of(&self, workspace: &str) -> Result<Vec<String>> {
        let jj = self.repo.root_jj();
        let mut paths: Vec<String> = jj
            .diff_summary(&jj.trunk(), &Jj::workspace_tip(workspace))?
            .into_iter()
            .map(|c| c.path)
            .collect();
        paths.dedup();
        Ok(paths)
    }

    /// Files touched by more than one of `workspaces`, sorted by path
    pub fn conflicts(&self, workspaces: &[String]) -> Result<Vec<FileOwnership>> {
        let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for workspace in workspaces {
            for path in self.files_of(workspace)? {
                let entry = owners.entry(path).or_default();
                if !entry.contains(workspace) {
                    entry.push(workspace.clone());
                }
            }
        }

        Ok(owners
            .into_iter()
            .filter(|(_, ws)| ws.len() > 1)
            .map(|(path, workspaces)| FileOwnership { path, workspaces })
            .collect())
    }

    /// Which of `workspaces` touch `file`
    pub fn owners_of(&self, file: &str, workspaces: &[String]) -> Result<Vec<String>> {
        let mut owners = Vec::new();
        for workspace in workspaces {
            if self.files_of(workspace)?.iter().any(|p| p == file) {
                owners.push(workspace.clone());
            }
        }
        Ok(owners)
    }
}
