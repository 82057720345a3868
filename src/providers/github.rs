use super::{CreatePr, MergeMethod, PrInfo, PrState, PullRequestProvider, UpdatePr};
use crate::config::Settings;
use crate::errors::{Result, WeaveError};
use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT},
    Client,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::collections::HashMap;
use tracing::{debug, trace};
use url::Url;

/// GitHub REST v3 client scoped to one repository
pub struct GitHubProvider {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
}

#[derive(Debug, Deserialize)]
struct GhRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhPull {
    number: u64,
    html_url: String,
    state: String,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    merged: Option<bool>,
    base: GhRef,
    head: GhRef,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    draft: bool,
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhReview {
    user: Option<GhUser>,
    state: String,
}

/// Collapse a PR's review history into GitHub's `reviewDecision` vocabulary.
/// Only each reviewer's latest verdict counts; comments are not verdicts.
fn review_decision(reviews: &[GhReview]) -> Option<String> {
    let mut latest: HashMap<&str, &str> = HashMap::new();
    for review in reviews {
        let Some(user) = &review.user else { continue };
        match review.state.as_str() {
            "APPROVED" | "CHANGES_REQUESTED" | "DISMISSED" => {
                latest.insert(&user.login, &review.state);
            }
            _ => {}
        }
    }
    if latest.values().any(|s| *s == "CHANGES_REQUESTED") {
        Some("CHANGES_REQUESTED".to_string())
    } else if latest.values().any(|s| *s == "APPROVED") {
        Some("APPROVED".to_string())
    } else {
        None
    }
}

impl From<GhPull> for PrInfo {
    fn from(pull: GhPull) -> Self {
        let merged = pull.merged.unwrap_or(false) || pull.merged_at.is_some();
        let state = match (pull.state.as_str(), merged) {
            (_, true) => PrState::Merged,
            ("open", false) => PrState::Open,
            _ => PrState::Closed,
        };
        PrInfo {
            number: pull.number,
            url: pull.html_url,
            state,
            base: pull.base.name,
            head: pull.head.name,
            title: pull.title,
            body: pull.body.unwrap_or_default(),
            is_draft: pull.draft,
            review_decision: None,
        }
    }
}

#[derive(Serialize)]
struct CreateBody<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
    draft: bool,
}

#[derive(Serialize)]
struct UpdateBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

#[derive(Serialize)]
struct MergeBody {
    merge_method: &'static str,
}

/// `(owner, repo)` from an https, ssh or scp-style remote URL
pub fn parse_repo_slug(remote_url: &str) -> Option<(String, String)> {
    let path = match Url::parse(remote_url) {
        Ok(url) if url.host_str().is_some() => url.path().to_string(),
        _ => {
            // scp-like: git@github.com:owner/repo.git
            let (_, path) = remote_url.split_once(':')?;
            path.to_string()
        }
    };
    let mut segments = path
        .trim_matches('/')
        .trim_end_matches(".git")
        .rsplitn(2, '/')
        .map(str::to_string);
    let repo = segments.next().filter(|s| !s.is_empty())?;
    let owner = segments.next()?.rsplit('/').next()?.to_string();
    if owner.is_empty() {
        return None;
    }
    Some((owner, repo))
}

impl GitHubProvider {
    pub fn new(api_url: &str, owner: &str, repo: &str, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("jj-weave"));
        if let Some(token) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| WeaveError::config(format!("Invalid auth header: {e}")))?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .map_err(|e| WeaveError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Build from settings, filling owner/repo from the remote URL and the token from the environment
    pub fn from_settings(settings: &Settings, remote_url: Option<&str>) -> Result<Self> {
        let derived = remote_url.and_then(parse_repo_slug);
        let owner = settings
            .github
            .owner
            .clone()
            .or_else(|| derived.as_ref().map(|(o, _)| o.clone()))
            .ok_or_else(|| {
                WeaveError::config("Cannot determine GitHub owner; set github.owner")
            })?;
        let repo = settings
            .github
            .repo
            .clone()
            .or_else(|| derived.as_ref().map(|(_, r)| r.clone()))
            .ok_or_else(|| WeaveError::config("Cannot determine GitHub repo; set github.repo"))?;
        let token = settings
            .github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .or_else(|| std::env::var("GH_TOKEN").ok());

        Self::new(&settings.github.api_url, &owner, &repo, token.as_deref())
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_url,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    async fn handle_response<T>(&self, response: reqwest::Response) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            trace!("Response body: {}", text);
            serde_json::from_str(&text)
                .map_err(|e| WeaveError::provider(format!("Failed to parse response: {e}")))
        } else {
            Err(WeaveError::provider(format!(
                "Request failed with status {status}: {text}"
            )))
        }
    }

    async fn pulls_for_branch(&self, branch: &str) -> Result<Option<PrInfo>> {
        let url = self.url("pulls");
        debug!("GET {} head={}", url, branch);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("head", format!("{}:{}", self.owner, branch)),
                ("state", "all".to_string()),
            ])
            .send()
            .await?;
        let pulls: Vec<GhPull> = self.handle_response(response).await?;

        let mut prs: Vec<PrInfo> = pulls.into_iter().map(PrInfo::from).collect();
        prs.sort_by_key(|p| (p.state != PrState::Open, std::cmp::Reverse(p.number)));
        match prs.into_iter().next() {
            Some(pr) => Ok(Some(self.with_review_decision(pr).await)),
            None => Ok(None),
        }
    }

    /// Fill `review_decision` for open PRs. Reviews are advisory, so a failed lookup leaves it unset.
    async fn with_review_decision(&self, mut pr: PrInfo) -> PrInfo {
        if pr.state != PrState::Open {
            return pr;
        }
        let url = self.url(&format!("pulls/{}/reviews", pr.number));
        debug!("GET {}", url);
        let reviews: Result<Vec<GhReview>> = match self.client.get(&url).send().await {
            Ok(response) => self.handle_response(response).await,
            Err(e) => Err(e.into()),
        };
        match reviews {
            Ok(reviews) => pr.review_decision = review_decision(&reviews),
            Err(e) => debug!("No review decision for #{}: {}", pr.number, e),
        }
        pr
    }
}

#[async_trait]
impl PullRequestProvider for GitHubProvider {
    async fn find_by_branches(&self, branches: &[String]) -> Result<Vec<PrInfo>> {
        let found = try_join_all(branches.iter().map(|b| self.pulls_for_branch(b))).await?;
        Ok(found.into_iter().flatten().collect())
    }

    async fn get(&self, number: u64) -> Result<PrInfo> {
        let url = self.url(&format!("pulls/{number}"));
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let pull: GhPull = self.handle_response(response).await?;
        Ok(self.with_review_decision(pull.into()).await)
    }

    async fn create(&self, request: CreatePr) -> Result<PrInfo> {
        let url = self.url("pulls");
        debug!("POST {} {} -> {}", url, request.head, request.base);
        let response = self
            .client
            .post(&url)
            .json(&CreateBody {
                title: &request.title,
                head: &request.head,
                base: &request.base,
                body: &request.body,
                draft: request.draft,
            })
            .send()
            .await?;
        let pull: GhPull = self.handle_response(response).await?;
        Ok(pull.into())
    }

    async fn update(&self, number: u64, update: UpdatePr) -> Result<PrInfo> {
        let url = self.url(&format!("pulls/{number}"));
        debug!("PATCH {}", url);
        let response = self
            .client
            .patch(&url)
            .json(&UpdateBody {
                base: update.base,
                title: update.title,
                body: update.body,
            })
            .send()
            .await?;
        let pull: GhPull = self.handle_response(response).await?;
        Ok(pull.into())
    }

    async fn merge(&self, number: u64, method: MergeMethod) -> Result<()> {
        let url = self.url(&format!("pulls/{number}/merge"));
        debug!("PUT {} ({})", url, method.as_str());
        let response = self
            .client
            .put(&url)
            .json(&MergeBody {
                merge_method: method.as_str(),
            })
            .send()
            .await?;
        let _: serde_json::Value = self.handle_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn pull(number: u64, head: &str, state: &str, merged_at: Option<&str>) -> serde_json::Value {
        json!({
            "number": number,
            "html_url": format!("https://github.com/acme/widgets/pull/{number}"),
            "state": state,
            "merged_at": merged_at,
            "base": {"ref": "main"},
            "head": {"ref": head},
            "title": "Add widget",
            "body": null,
            "draft": false
        })
    }

    #[test]
    fn test_parse_repo_slug() {
        assert_eq!(
            parse_repo_slug("git@github.com:acme/widgets.git"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            parse_repo_slug("https://github.com/acme/widgets"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            parse_repo_slug("ssh://git@github.com/acme/widgets.git"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(parse_repo_slug("not a remote"), None);
    }

    #[test]
    fn test_from_settings_prefers_configured_owner() {
        let mut settings = Settings::default();
        settings.github.owner = Some("fork".to_string());
        settings.github.token = Some("t".to_string());
        let provider =
            GitHubProvider::from_settings(&settings, Some("git@github.com:acme/widgets.git"))
                .unwrap();
        assert_eq!(provider.owner, "fork");
        assert_eq!(provider.repo, "widgets");
    }

    #[tokio::test]
    async fn test_find_by_branches_prefers_open_pr() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/acme/widgets/pulls")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("head".into(), "acme:feat-a".into()),
                Matcher::UrlEncoded("state".into(), "all".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    pull(3, "feat-a", "closed", None),
                    pull(5, "feat-a", "open", None)
                ])
                .to_string(),
            )
            .create_async()
            .await;
        let _empty = server
            .mock("GET", "/repos/acme/widgets/pulls")
            .match_query(Matcher::UrlEncoded("head".into(), "acme:feat-b".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let provider = GitHubProvider::new(&server.url(), "acme", "widgets", Some("t")).unwrap();
        let found = provider
            .find_by_branches(&["feat-a".to_string(), "feat-b".to_string()])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].number, 5);
        assert_eq!(found[0].state, PrState::Open);
    }

    #[tokio::test]
    async fn test_get_maps_merged_state() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/acme/widgets/pulls/9")
            .with_status(200)
            .with_body(pull(9, "feat", "closed", Some("2026-01-01T00:00:00Z")).to_string())
            .create_async()
            .await;

        let provider = GitHubProvider::new(&server.url(), "acme", "widgets", None).unwrap();
        let pr = provider.get(9).await.unwrap();
        assert_eq!(pr.state, PrState::Merged);
        assert_eq!(pr.body, "");
    }

    fn review(login: &str, state: &str) -> GhReview {
        GhReview {
            user: Some(GhUser {
                login: login.to_string(),
            }),
            state: state.to_string(),
        }
    }

    #[test]
    fn test_review_decision_uses_latest_review_per_user() {
        assert_eq!(review_decision(&[]), None);
        assert_eq!(review_decision(&[review("ann", "COMMENTED")]), None);
        assert_eq!(
            review_decision(&[review("ann", "CHANGES_REQUESTED"), review("ann", "APPROVED")]),
            Some("APPROVED".to_string())
        );
        assert_eq!(
            review_decision(&[review("ann", "APPROVED"), review("bob", "CHANGES_REQUESTED")]),
            Some("CHANGES_REQUESTED".to_string())
        );
        assert_eq!(
            review_decision(&[review("ann", "APPROVED"), review("ann", "DISMISSED")]),
            None
        );
    }

    #[tokio::test]
    async fn test_get_reads_review_decision_of_open_pr() {
        let mut server = mockito::Server::new_async().await;
        let _pull = server
            .mock("GET", "/repos/acme/widgets/pulls/6")
            .with_status(200)
            .with_body(pull(6, "feat", "open", None).to_string())
            .create_async()
            .await;
        let _reviews = server
            .mock("GET", "/repos/acme/widgets/pulls/6/reviews")
            .with_status(200)
            .with_body(
                json!([
                    {"user": {"login": "ann"}, "state": "COMMENTED"},
                    {"user": {"login": "ann"}, "state": "APPROVED"}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let provider = GitHubProvider::new(&server.url(), "acme", "widgets", Some("t")).unwrap();
        let pr = provider.get(6).await.unwrap();
        assert_eq!(pr.review_decision.as_deref(), Some("APPROVED"));
    }

    #[tokio::test]
    async fn test_create_sends_draft_flag() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/repos/acme/widgets/pulls")
            .match_body(Matcher::PartialJson(json!({
                "head": "feat",
                "base": "main",
                "draft": true
            })))
            .with_status(201)
            .with_body(pull(12, "feat", "open", None).to_string())
            .create_async()
            .await;

        let provider = GitHubProvider::new(&server.url(), "acme", "widgets", Some("t")).unwrap();
        let pr = provider
            .create(CreatePr {
                head: "feat".to_string(),
                base: "main".to_string(),
                title: "Add widget".to_string(),
                body: String::new(),
                draft: true,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(pr.number, 12);
    }

    #[tokio::test]
    async fn test_errors_keep_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/repos/acme/widgets/pulls/4/merge")
            .with_status(405)
            .with_body(r#"{"message":"Pull Request is not mergeable"}"#)
            .create_async()
            .await;

        let provider = GitHubProvider::new(&server.url(), "acme", "widgets", Some("t")).unwrap();
        let err = provider.merge(4, MergeMethod::Squash).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("405"));
        assert!(msg.contains("not mergeable"));
    }
}
