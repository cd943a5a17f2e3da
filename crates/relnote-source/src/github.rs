use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relnote_config::SourceConfig;
use relnote_core::{Author, DiscussionEntry};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::{RawChangeSet, RawFile, RawIssue, RepoRef, SourceControl, SourceError};

const USER_AGENT: &str = concat!("relnote/", env!("CARGO_PKG_VERSION"));
const FILES_PER_PAGE: u32 = 100;
const COMMENTS_PER_PAGE: u32 = 100;

/// REST v3 adapter for GitHub.
#[derive(Debug, Clone)]
pub struct GitHubSource {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullPayload {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_url: String,
    user: Option<UserPayload>,
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    draft: bool,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    #[serde(default)]
    login: String,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct FilePayload {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentPayload {
    user: Option<UserPayload>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_url: String,
    body: Option<String>,
    pull_request: Option<serde_json::Value>,
}

impl From<PullPayload> for RawChangeSet {
    fn from(payload: PullPayload) -> Self {
        Self {
            number: payload.number,
            title: payload.title,
            html_url: payload.html_url,
            author: payload.user.map(Author::from).unwrap_or_default(),
            merged_at: payload.merged_at,
            draft: payload.draft,
            body: payload.body.unwrap_or_default(),
        }
    }
}

impl From<UserPayload> for Author {
    fn from(payload: UserPayload) -> Self {
        Self {
            login: payload.login,
            profile_url: payload.html_url,
        }
    }
}

impl GitHubSource {
    pub fn new(
        api_base: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let api_base = api_base.into().trim_end_matches('/').to_owned();
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()?,
            api_base,
            token: token
                .map(|token| token.trim().to_owned())
                .filter(|token| !token.is_empty()),
        })
    }

    /// Builds the adapter from config; the token env var is optional.
    pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
        let token = env::var(&config.token_env).ok();
        if token.is_none() {
            tracing::debug!(
                token_env = %config.token_env,
                "no source-control token set, using unauthenticated requests"
            );
        }
        Self::new(
            config.api_base.clone(),
            token,
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }

    fn repo_url(&self, repo: &RepoRef, path: &str) -> String {
        format!("{}/repos/{}/{}{}", self.api_base, repo.owner, repo.repo, path)
    }

    /// GET returning `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, SourceError> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = response.error_for_status()?.bytes().await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[async_trait]
impl SourceControl for GitHubSource {
    async fn list_closed(
        &self,
        repo: &RepoRef,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<RawChangeSet>, SourceError> {
        let url = self.repo_url(repo, "/pulls");
        let query = [
            ("state", "closed".to_owned()),
            ("sort", "created".to_owned()),
            ("direction", "desc".to_owned()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        let pulls: Vec<PullPayload> = self
            .get_json(&url, &query)
            .await?
            .ok_or_else(|| SourceError::Unavailable(format!("repository {} not found", repo.slug())))?;
        Ok(pulls.into_iter().map(RawChangeSet::from).collect())
    }

    async fn get_change_set(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Option<RawChangeSet>, SourceError> {
        let url = self.repo_url(repo, &format!("/pulls/{number}"));
        let pull: Option<PullPayload> = self.get_json(&url, &[]).await?;
        Ok(pull.map(RawChangeSet::from))
    }

    async fn list_files(&self, repo: &RepoRef, number: u64) -> Result<Vec<RawFile>, SourceError> {
        let url = self.repo_url(repo, &format!("/pulls/{number}/files"));
        let files: Vec<FilePayload> = self
            .get_json(&url, &[("per_page", FILES_PER_PAGE.to_string())])
            .await?
            .unwrap_or_default();
        Ok(files
            .into_iter()
            .map(|file| RawFile {
                filename: file.filename,
                additions: file.additions,
                deletions: file.deletions,
                patch: file.patch,
            })
            .collect())
    }

    async fn list_discussion(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<DiscussionEntry>, SourceError> {
        let url = self.repo_url(repo, &format!("/issues/{number}/comments"));
        let comments: Vec<CommentPayload> = self
            .get_json(&url, &[("per_page", COMMENTS_PER_PAGE.to_string())])
            .await?
            .unwrap_or_default();
        Ok(comments
            .into_iter()
            .filter_map(|comment| {
                let body = comment.body?.trim().to_owned();
                if body.is_empty() {
                    return None;
                }
                Some(DiscussionEntry {
                    author: comment.user.map(|user| user.login).unwrap_or_default(),
                    body,
                })
            })
            .collect())
    }

    async fn list_labeled_issues(
        &self,
        repo: &RepoRef,
        label: &str,
        limit: u32,
    ) -> Result<Vec<RawIssue>, SourceError> {
        let url = self.repo_url(repo, "/issues");
        let query = [
            ("state", "open".to_owned()),
            ("labels", label.to_owned()),
            ("per_page", limit.clamp(1, 100).to_string()),
        ];
        let issues: Vec<IssuePayload> = self.get_json(&url, &query).await?.unwrap_or_default();
        Ok(issues
            .into_iter()
            .map(|issue| RawIssue {
                title: issue.title,
                html_url: issue.html_url,
                body: issue.body.unwrap_or_default(),
                is_pull_request: issue.pull_request.is_some(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_payload_maps_to_raw_change_set() {
        let payload: PullPayload = serde_json::from_str(
            r#"{
                "number": 12,
                "title": "feat: add retries",
                "html_url": "https://github.com/acme/widget/pull/12",
                "user": {"login": "octo", "html_url": "https://github.com/octo"},
                "merged_at": "2025-05-10T08:00:00Z",
                "draft": false,
                "body": null
            }"#,
        )
        .expect("parse pull payload");

        let raw = RawChangeSet::from(payload);

        assert_eq!(raw.number, 12);
        assert_eq!(raw.author.login, "octo");
        assert!(raw.is_eligible());
        assert!(raw.body.is_empty());
    }

    #[test]
    fn unmerged_pull_payload_is_not_eligible() {
        let payload: PullPayload =
            serde_json::from_str(r#"{"number": 3, "merged_at": null, "user": null}"#)
                .expect("parse pull payload");

        let raw = RawChangeSet::from(payload);

        assert!(!raw.is_eligible());
        assert_eq!(raw.author, Author::default());
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let source = GitHubSource::new("https://api.github.com/", None, Duration::from_secs(5))
            .expect("build source");
        assert_eq!(
            source.repo_url(&RepoRef::new("acme", "widget"), "/pulls"),
            "https://api.github.com/repos/acme/widget/pulls"
        );
    }
}
