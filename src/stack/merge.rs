use super::StackEngine;
use crate::errors::{Result, WeaveError};
use crate::providers::{MergeMethod, PrInfo, PrState, PullRequestProvider, UpdatePr};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeResult {
    pub merged: Vec<u64>,
    pub untracked: Vec<String>,
}

/// Bottom-up order: each PR comes after the PR whose head it is based on
fn bottom_up(mut prs: Vec<PrInfo>) -> Result<Vec<PrInfo>> {
    let mut ordered = Vec::with_capacity(prs.len());
    while !prs.is_empty() {
        let next = prs
            .iter()
            .position(|pr| !prs.iter().any(|other| other.head == pr.base))
            .ok_or_else(|| WeaveError::invalid_state("PR bases form a cycle"))?;
        ordered.push(prs.remove(next));
    }
    Ok(ordered)
}

impl<'a> StackEngine<'a> {
    /// Land `numbers` bottom-up, waiting for each merge to show up before the next
    pub async fn merge(
        &self,
        provider: &dyn PullRequestProvider,
        numbers: &[u64],
        method: MergeMethod,
    ) -> Result<MergeResult> {
        if numbers.is_empty() {
            return Err(WeaveError::invalid_input("No pull requests to merge"));
        }

        let mut prs = Vec::with_capacity(numbers.len());
        for number in numbers {
            let pr = provider.get(*number).await?;
            if pr.state != PrState::Open {
                return Err(WeaveError::invalid_state(format!(
                    "PR #{} is {}, only open PRs can be merged",
                    pr.number, pr.state
                )));
            }
            prs.push(pr);
        }

        let trunk = self.jj().trunk_branch().to_string();
        let mut result = MergeResult::default();

        for pr in bottom_up(prs)? {
            if pr.base != trunk {
                debug!("Retargeting #{} onto {}", pr.number, trunk);
                provider
                    .update(
                        pr.number,
                        UpdatePr {
                            base: Some(trunk.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
            }

            provider.merge(pr.number, method).await?;
            self.wait_until_merged(provider, pr.number).await?;
            info!("Merged #{} ({})", pr.number, pr.head);
            result.merged.push(pr.number);

            if self.tracking.untrack(&pr.head)? {
                result.untracked.push(pr.head.clone());
            }
        }

        if let Err(e) = self.jj().fetch() {
            warn!("Merged, but fetching the result failed: {}", e);
        }
        Ok(result)
    }

    async fn wait_until_merged(&self, provider: &dyn PullRequestProvider, number: u64) -> Result<()> {
        let settings = &self.repo.settings().merge;
        let interval = Duration::from_secs(settings.poll_interval_secs);
        let deadline = Instant::now() + Duration::from_secs(settings.max_wait_secs);

        loop {
            if provider.get(number).await?.state == PrState::Merged {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(WeaveError::invalid_state(format!(
                    "PR #{number} did not show as merged within {}s",
                    settings.max_wait_secs
                )));
            }
            tokio::time::sleep(interval).await;
        }
    }
}
