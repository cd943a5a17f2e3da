use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relnote_config::{DEFAULT_MAX_PAGES, DEFAULT_PER_PAGE, MAX_PER_PAGE, SourceConfig};
use relnote_core::{
    Author, ChangeSetDetail, ChangeSetRecord, DiscussionEntry, FileChange, GoodFirstIssue,
    MonthWindow, truncate_chars,
};
use thiserror::Error;
use tracing::{Instrument, Span};

mod github;
mod memory;

pub use github::GitHubSource;
pub use memory::StaticSource;

const GOOD_FIRST_ISSUE_BODY_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response decoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid source response: {0}")]
    InvalidResponse(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// A change-set as the hosting service reports it, before any analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChangeSet {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub author: Author,
    pub merged_at: Option<DateTime<Utc>>,
    pub draft: bool,
    pub body: String,
}

impl RawChangeSet {
    /// Merged and not a draft.
    pub fn is_eligible(&self) -> bool {
        self.merged_at.is_some() && !self.draft
    }

    pub fn into_record(self) -> ChangeSetRecord {
        let record = ChangeSetRecord::new(self.number, self.title, self.html_url, self.author);
        match self.merged_at {
            Some(merged_at) => record.with_merged_at(merged_at),
            None => record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawFile {
    pub filename: String,
    pub additions: u64,
    pub deletions: u64,
    pub patch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIssue {
    pub title: String,
    pub html_url: String,
    pub body: String,
    pub is_pull_request: bool,
}

/// Transport seam over the hosting service's REST API.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// One page of closed change-sets, newest first by creation time.
    async fn list_closed(
        &self,
        repo: &RepoRef,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<RawChangeSet>, SourceError>;

    async fn get_change_set(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Option<RawChangeSet>, SourceError>;

    async fn list_files(&self, repo: &RepoRef, number: u64) -> Result<Vec<RawFile>, SourceError>;

    async fn list_discussion(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<DiscussionEntry>, SourceError>;

    async fn list_labeled_issues(
        &self,
        repo: &RepoRef,
        label: &str,
        limit: u32,
    ) -> Result<Vec<RawIssue>, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalPolicy {
    pub per_page: u32,
    pub max_pages: u32,
}

impl RetrievalPolicy {
    /// Clamps `per_page` into 1..=100 and maps a zero page ceiling to the default.
    pub fn new(per_page: u32, max_pages: u32) -> Self {
        let per_page = match per_page {
            0 => DEFAULT_PER_PAGE,
            value => value.min(MAX_PER_PAGE),
        };
        let max_pages = if max_pages == 0 {
            DEFAULT_MAX_PAGES
        } else {
            max_pages
        };
        Self {
            per_page,
            max_pages,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.per_page, config.max_pages)
    }
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PER_PAGE, DEFAULT_MAX_PAGES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailProfile {
    pub max_files: usize,
    pub patch_excerpt_chars: usize,
    pub include_discussion: bool,
}

impl DetailProfile {
    pub fn standard(include_discussion: bool) -> Self {
        Self {
            max_files: 10,
            patch_excerpt_chars: 200,
            include_discussion,
        }
    }

    pub fn deep_dive() -> Self {
        Self {
            max_files: 20,
            patch_excerpt_chars: 2000,
            include_discussion: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowRetrieval {
    pub items: Vec<RawChangeSet>,
    pub pages_fetched: u32,
    pub failed_pages: u32,
    pub truncated: bool,
}

impl WindowRetrieval {
    /// True when pages were requested and every one of them failed.
    pub fn all_pages_failed(&self) -> bool {
        self.pages_fetched > 0 && self.failed_pages == self.pages_fetched
    }
}

pub struct SourceControlClient {
    source: Arc<dyn SourceControl>,
    repo: RepoRef,
    policy: RetrievalPolicy,
    span: Span,
}

impl SourceControlClient {
    pub fn new(
        source: Arc<dyn SourceControl>,
        repo: RepoRef,
        policy: RetrievalPolicy,
        span: Span,
    ) -> Self {
        Self {
            source,
            repo,
            policy,
            span,
        }
    }

    /// Pages closed change-sets until the window is exhausted.
    ///
    /// Paging stops on an empty page or when the last raw item of a page was
    /// merged before the window opens. Hitting the page ceiling first marks
    /// the result truncated. A failing page is skipped and still counts
    /// toward the ceiling. When every page fails the result is empty and
    /// not truncated.
    pub async fn list_in_window(&self, window: MonthWindow) -> WindowRetrieval {
        async {
            let lower_bound = window.lower_bound();
            let mut retrieval = WindowRetrieval::default();
            let mut seen = HashSet::new();
            let mut exhausted = false;

            for page in 1..=self.policy.max_pages {
                retrieval.pages_fetched += 1;
                let batch = match self
                    .source
                    .list_closed(&self.repo, page, self.policy.per_page)
                    .await
                {
                    Ok(batch) => batch,
                    Err(err) => {
                        retrieval.failed_pages += 1;
                        tracing::warn!(page, error = %err, "skipping change-set page after request failure");
                        continue;
                    }
                };

                if batch.is_empty() {
                    exhausted = true;
                    break;
                }

                let past_window = match (lower_bound, batch.last().and_then(|item| item.merged_at)) {
                    (Some(lower_bound), Some(merged_at)) => merged_at < lower_bound,
                    _ => false,
                };

                let before = retrieval.items.len();
                retrieval.items.extend(batch.into_iter().filter(|item| {
                    item.is_eligible()
                        && item.merged_at.is_some_and(|merged_at| window.contains(merged_at))
                        && seen.insert(item.number)
                }));
                tracing::debug!(
                    page,
                    kept = retrieval.items.len() - before,
                    "fetched change-set page"
                );

                if past_window {
                    exhausted = true;
                    break;
                }
            }

            if retrieval.all_pages_failed() {
                tracing::warn!(
                    pages = retrieval.pages_fetched,
                    window = %window.label(),
                    "every change-set page request failed; no change-sets retrieved"
                );
            } else if !exhausted {
                retrieval.truncated = true;
                tracing::warn!(
                    max_pages = self.policy.max_pages,
                    window = %window.label(),
                    "page ceiling reached before the window was exhausted; results may be incomplete"
                );
            }

            tracing::info!(
                window = %window.label(),
                count = retrieval.items.len(),
                pages = retrieval.pages_fetched,
                "retrieved change-sets in window"
            );
            retrieval
        }
        .instrument(self.span.clone())
        .await
    }

    /// Body, file changes and (optionally) discussion for one change-set.
    pub async fn get_detail(&self, number: u64, profile: DetailProfile) -> Option<ChangeSetDetail> {
        async {
            let change_set = match self.source.get_change_set(&self.repo, number).await {
                Ok(Some(change_set)) => change_set,
                Ok(None) => {
                    tracing::warn!(number, "change-set not found while fetching detail");
                    return None;
                }
                Err(err) => {
                    tracing::warn!(number, error = %err, "change-set detail request failed");
                    return None;
                }
            };

            let files = match self.source.list_files(&self.repo, number).await {
                Ok(files) => files,
                Err(err) => {
                    tracing::warn!(number, error = %err, "change-set file listing failed");
                    return None;
                }
            };

            let discussion = if profile.include_discussion {
                self.source
                    .list_discussion(&self.repo, number)
                    .await
                    .unwrap_or_else(|err| {
                        tracing::warn!(number, error = %err, "discussion unavailable, continuing without it");
                        Vec::new()
                    })
            } else {
                Vec::new()
            };

            Some(build_detail(change_set.body, files, discussion, profile))
        }
        .instrument(self.span.clone())
        .await
    }

    /// `None` for not-found and for any transport or decoding error.
    pub async fn get_by_id(&self, number: u64) -> Option<RawChangeSet> {
        match self
            .source
            .get_change_set(&self.repo, number)
            .instrument(self.span.clone())
            .await
        {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(parent: &self.span, number, error = %err, "change-set lookup failed");
                None
            }
        }
    }

    /// Eligible change-sets for an id list, deduplicated in first-seen order.
    pub async fn get_many(&self, numbers: &[u64]) -> Vec<RawChangeSet> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for &number in numbers {
            if !seen.insert(number) {
                continue;
            }
            match self.get_by_id(number).await {
                Some(change_set) if change_set.is_eligible() => found.push(change_set),
                Some(_) => {
                    tracing::info!(parent: &self.span, number, "skipping change-set that is unmerged or a draft");
                }
                None => {
                    tracing::info!(parent: &self.span, number, "skipping change-set that could not be retrieved");
                }
            }
        }
        found
    }

    /// Open issues carrying `label`; pull requests are excluded.
    pub async fn good_first_issues(&self, label: &str, limit: u32) -> Vec<GoodFirstIssue> {
        if limit == 0 {
            return Vec::new();
        }
        match self
            .source
            .list_labeled_issues(&self.repo, label, limit)
            .instrument(self.span.clone())
            .await
        {
            Ok(issues) => issues
                .into_iter()
                .filter(|issue| !issue.is_pull_request)
                .take(limit as usize)
                .map(|issue| GoodFirstIssue {
                    title: issue.title,
                    url: issue.html_url,
                    body: truncate_chars(issue.body.trim(), GOOD_FIRST_ISSUE_BODY_CHARS).to_owned(),
                })
                .collect(),
            Err(err) => {
                tracing::warn!(parent: &self.span, label, error = %err, "good first issues unavailable");
                Vec::new()
            }
        }
    }
}

fn build_detail(
    body: String,
    files: Vec<RawFile>,
    discussion: Vec<DiscussionEntry>,
    profile: DetailProfile,
) -> ChangeSetDetail {
    let total_changes = files
        .iter()
        .map(|file| file.additions + file.deletions)
        .sum();
    let files = files
        .into_iter()
        .take(profile.max_files)
        .map(|file| FileChange {
            patch: file
                .patch
                .as_deref()
                .map(|patch| truncate_chars(patch, profile.patch_excerpt_chars).to_owned())
                .unwrap_or_default(),
            filename: file.filename,
            additions: file.additions,
            deletions: file.deletions,
        })
        .collect();

    ChangeSetDetail {
        body,
        total_changes,
        files,
        discussion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_file(name: &str, additions: u64, deletions: u64, patch: &str) -> RawFile {
        RawFile {
            filename: name.to_owned(),
            additions,
            deletions,
            patch: Some(patch.to_owned()),
        }
    }

    #[test]
    fn retrieval_policy_clamps_paging_limits() {
        assert_eq!(RetrievalPolicy::new(500, 0), RetrievalPolicy::new(100, 20));
        assert_eq!(RetrievalPolicy::new(0, 3).per_page, DEFAULT_PER_PAGE);
        assert_eq!(RetrievalPolicy::new(30, 3).per_page, 30);
    }

    #[test]
    fn detail_counts_changes_before_file_ceiling() {
        let files = (0..12)
            .map(|index| raw_file(&format!("src/f{index}.rs"), 2, 1, &"x".repeat(300)))
            .collect();

        let detail = build_detail(
            "body".to_owned(),
            files,
            Vec::new(),
            DetailProfile::standard(false),
        );

        assert_eq!(detail.total_changes, 36);
        assert_eq!(detail.files.len(), 10);
        assert!(detail.files.iter().all(|file| file.patch.chars().count() == 200));
    }

    #[test]
    fn deep_dive_profile_keeps_more_context() {
        let files = (0..25)
            .map(|index| raw_file(&format!("f{index}"), 1, 0, &"y".repeat(2500)))
            .collect();

        let detail = build_detail(String::new(), files, Vec::new(), DetailProfile::deep_dive());

        assert_eq!(detail.files.len(), 20);
        assert_eq!(detail.files[0].patch.len(), 2000);
        assert_eq!(detail.total_changes, 25);
    }
}
