use super::StackEngine;
use crate::errors::{Result, WeaveError};
use crate::jj::backend::revset_symbol;
use crate::providers::{PrInfo, PrState, PullRequestProvider};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

/// Longest base chain `get` will follow
const MAX_CHAIN_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetTarget {
    Number(u64),
    Branch(String),
}

impl GetTarget {
    /// Accepts `123`, `#123`, a PR URL ending in `/pull/123`, or a branch name
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(WeaveError::invalid_input("Empty PR target"));
        }
        let numeric = input.strip_prefix('#').unwrap_or(input);
        if let Ok(number) = numeric.parse::<u64>() {
            return Ok(GetTarget::Number(number));
        }
        if let Some((_, tail)) = input.rsplit_once("/pull/") {
            let digits = tail.split(['/', '#', '?']).next().unwrap_or_default();
            return digits
                .parse::<u64>()
                .map(GetTarget::Number)
                .map_err(|_| WeaveError::invalid_input(format!("Cannot read a PR number from {input}")));
        }
        Ok(GetTarget::Branch(input.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GetResult {
    pub target: PrInfo,
    /// Bookmarks recreated locally, bottom to top
    pub restored: Vec<String>,
    pub skipped: Vec<PrInfo>,
}

impl<'a> StackEngine<'a> {
    async fn pr_for_branch(
        &self,
        provider: &dyn PullRequestProvider,
        branch: &str,
    ) -> Result<Option<PrInfo>> {
        Ok(provider
            .find_by_branches(&[branch.to_string()])
            .await?
            .into_iter()
            .next())
    }

    /// Recreate a remote PR stack locally and check out its top
    pub async fn get(&self, provider: &dyn PullRequestProvider, target: &str) -> Result<GetResult> {
        let jj = self.jj();
        let trunk = jj.trunk_branch().to_string();

        let target = match GetTarget::parse(target)? {
            GetTarget::Number(number) => provider.get(number).await?,
            GetTarget::Branch(branch) => self
                .pr_for_branch(provider, &branch)
                .await?
                .ok_or_else(|| WeaveError::not_found(format!("No PR for branch '{branch}'")))?,
        };
        if target.state != PrState::Open {
            return Err(WeaveError::invalid_state(format!(
                "PR #{} is {}",
                target.number, target.state
            )));
        }

        let mut chain = vec![target.clone()];
        let mut seen: HashSet<String> = HashSet::from([target.head.clone()]);
        let mut base = target.base.clone();
        while base != trunk {
            if chain.len() >= MAX_CHAIN_DEPTH {
                return Err(WeaveError::invalid_state(format!(
                    "PR base chain deeper than {MAX_CHAIN_DEPTH}"
                )));
            }
            if !seen.insert(base.clone()) {
                return Err(WeaveError::invalid_state(format!(
                    "PR base chain loops back to '{base}'"
                )));
            }
            let Some(parent) = self.pr_for_branch(provider, &base).await? else {
                warn!("No PR found for base branch {}; stopping there", base);
                break;
            };
            base = parent.base.clone();
            chain.push(parent);
        }

        jj.fetch()?;

        let bookmarks = jj.bookmarks()?;
        let mut result = GetResult {
            target: target.clone(),
            restored: Vec::new(),
            skipped: Vec::new(),
        };
        for pr in chain.into_iter().rev() {
            if pr.state != PrState::Open {
                warn!("Skipping {} (#{} is {})", pr.head, pr.number, pr.state);
                result.skipped.push(pr);
                continue;
            }
            let has_local = bookmarks
                .iter()
                .any(|b| b.name == pr.head && b.local.is_some());
            if has_local {
                jj.bookmark_set(&pr.head, &jj.remote_ref(&pr.head), true)?;
            } else {
                jj.bookmark_track(&pr.head)?;
            }
            self.tracking.set_pr(&pr.head, pr.clone())?;
            result.restored.push(pr.head);
        }

        jj.new_change(&[revset_symbol(&target.head)], None)?;
        info!("Checked out #{} ({})", target.number, target.head);
        Ok(result)
    }
}
