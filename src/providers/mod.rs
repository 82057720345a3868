//! Hosted pull-request service. Consumed by the stack engine; auth, rate limiting
//! and retries belong to the implementation.

pub mod github;

pub use github::GitHubProvider;

use crate::errors::{Result, WeaveError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrState::Open => write!(f, "OPEN"),
            PrState::Closed => write!(f, "CLOSED"),
            PrState::Merged => write!(f, "MERGED"),
        }
    }
}

/// Pull request metadata as cached in the tracking store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrInfo {
    pub number: u64,
    pub url: String,
    pub state: PrState,
    /// Branch the PR merges into
    pub base: String,
    /// Branch the PR merges from
    pub head: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_decision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePr {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePr {
    pub base: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

impl FromStr for MergeMethod {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "merge" => Ok(MergeMethod::Merge),
            "squash" => Ok(MergeMethod::Squash),
            "rebase" => Ok(MergeMethod::Rebase),
            other => Err(WeaveError::invalid_input(format!(
                "Unknown merge method '{other}' (expected merge, squash or rebase)"
            ))),
        }
    }
}

/// Operations the stack engine needs from a hosted-PR service
#[async_trait]
pub trait PullRequestProvider: Send + Sync {
    /// Most relevant PR per head branch (open first, then most recent). Branches without one are omitted.
    async fn find_by_branches(&self, branches: &[String]) -> Result<Vec<PrInfo>>;

    async fn get(&self, number: u64) -> Result<PrInfo>;

    async fn create(&self, request: CreatePr) -> Result<PrInfo>;

    async fn update(&self, number: u64, update: UpdatePr) -> Result<PrInfo>;

    async fn merge(&self, number: u64, method: MergeMethod) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory PR service for stack engine tests.

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeProvider {
        prs: Mutex<Vec<PrInfo>>,
        merged: Mutex<Vec<u64>>,
        /// Merges only become visible after this many `get` calls
        merge_visibility_delay: Mutex<usize>,
    }

    impl FakeProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_pr(self, pr: PrInfo) -> Self {
            self.prs.lock().unwrap().push(pr);
            self
        }

        pub fn delay_merges(self, polls: usize) -> Self {
            *self.merge_visibility_delay.lock().unwrap() = polls;
            self
        }

        pub fn prs(&self) -> Vec<PrInfo> {
            self.prs.lock().unwrap().clone()
        }

        pub fn pr(&self, number: u64) -> Option<PrInfo> {
            self.prs().into_iter().find(|p| p.number == number)
        }

        pub fn merged(&self) -> Vec<u64> {
            self.merged.lock().unwrap().clone()
        }
    }

    pub fn pr(number: u64, head: &str, base: &str, state: PrState) -> PrInfo {
        PrInfo {
            number,
            url: format!("https://github.com/acme/widgets/pull/{number}"),
            state,
            base: base.to_string(),
            head: head.to_string(),
            title: format!("PR {number}"),
            body: String::new(),
            is_draft: false,
            review_decision: None,
        }
    }

    #[async_trait]
    impl PullRequestProvider for FakeProvider {
        async fn find_by_branches(&self, branches: &[String]) -> Result<Vec<PrInfo>> {
            let prs = self.prs();
            Ok(branches
                .iter()
                .filter_map(|b| {
                    let mut candidates: Vec<&PrInfo> = prs.iter().filter(|p| &p.head == b).collect();
                    candidates.sort_by_key(|p| (p.state != PrState::Open, std::cmp::Reverse(p.number)));
                    candidates.first().map(|p| (*p).clone())
                })
                .collect())
        }

        async fn get(&self, number: u64) -> Result<PrInfo> {
            let mut delay = self.merge_visibility_delay.lock().unwrap();
            let mut pr = self
                .pr(number)
                .ok_or_else(|| WeaveError::not_found(format!("PR #{number}")))?;
            if pr.state == PrState::Merged && *delay > 0 {
                *delay -= 1;
                pr.state = PrState::Open;
            }
            Ok(pr)
        }

        async fn create(&self, request: CreatePr) -> Result<PrInfo> {
            let mut prs = self.prs.lock().unwrap();
            let number = prs.iter().map(|p| p.number).max().unwrap_or(0) + 1;
            let pr = PrInfo {
                number,
                url: format!("https://github.com/acme/widgets/pull/{number}"),
                state: PrState::Open,
                base: request.base,
                head: request.head,
                title: request.title,
                body: request.body,
                is_draft: request.draft,
                review_decision: None,
            };
            prs.push(pr.clone());
            Ok(pr)
        }

        async fn update(&self, number: u64, update: UpdatePr) -> Result<PrInfo> {
            let mut prs = self.prs.lock().unwrap();
            let pr = prs
                .iter_mut()
                .find(|p| p.number == number)
                .ok_or_else(|| WeaveError::not_found(format!("PR #{number}")))?;
            if let Some(base) = update.base {
                pr.base = base;
            }
            if let Some(title) = update.title {
                pr.title = title;
            }
            if let Some(body) = update.body {
                pr.body = body;
            }
            Ok(pr.clone())
        }

        async fn merge(&self, number: u64, _method: MergeMethod) -> Result<()> {
            let mut prs = self.prs.lock().unwrap();
            let pr = prs
                .iter_mut()
                .find(|p| p.number == number)
                .ok_or_else(|| WeaveError::not_found(format!("PR #{number}")))?;
            if pr.state != PrState::Open {
                return Err(WeaveError::provider(format!("PR #{number} is not open")));
            }
            pr.state = PrState::Merged;
            self.merged.lock().unwrap().push(number);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_method_parsing() {
        assert_eq!("squash".parse::<MergeMethod>().unwrap(), MergeMethod::Squash);
        assert!(matches!(
            "fast-forward".parse::<MergeMethod>(),
            Err(WeaveError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_pr_info_serializes_camel_case() {
        let pr = fake::pr(7, "feat", "main", PrState::Open);
        let json = serde_json::to_value(&pr).unwrap();
        assert_eq!(json["isDraft"], false);
        assert_eq!(json["state"], "OPEN");
        assert!(json.get("reviewDecision").is_none());
    }
}
