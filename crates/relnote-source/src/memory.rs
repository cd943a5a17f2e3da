use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use relnote_core::DiscussionEntry;

use crate::{RawChangeSet, RawFile, RawIssue, RepoRef, SourceControl, SourceError};

/// In-memory source for tests and offline runs.
///
/// Pages are served exactly as registered; anything past the last page is
/// empty. Change-sets added through a page are also reachable by number.
#[derive(Debug, Default)]
pub struct StaticSource {
    pages: Vec<Vec<RawChangeSet>>,
    change_sets: HashMap<u64, RawChangeSet>,
    files: HashMap<u64, Vec<RawFile>>,
    discussion: HashMap<u64, Vec<DiscussionEntry>>,
    issues: Vec<RawIssue>,
    failing_pages: HashSet<u32>,
    failing_lookups: HashSet<u64>,
    failing_discussion: bool,
    list_requests: AtomicU32,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, items: Vec<RawChangeSet>) -> Self {
        for item in &items {
            self.change_sets.insert(item.number, item.clone());
        }
        self.pages.push(items);
        self
    }

    /// Registers a change-set reachable by number but absent from every page.
    pub fn with_change_set(mut self, item: RawChangeSet) -> Self {
        self.change_sets.insert(item.number, item);
        self
    }

    pub fn with_files(mut self, number: u64, files: Vec<RawFile>) -> Self {
        self.files.insert(number, files);
        self
    }

    pub fn with_discussion(mut self, number: u64, entries: Vec<DiscussionEntry>) -> Self {
        self.discussion.insert(number, entries);
        self
    }

    pub fn with_issues(mut self, issues: Vec<RawIssue>) -> Self {
        self.issues = issues;
        self
    }

    pub fn failing_page(mut self, page: u32) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub fn failing_lookup(mut self, number: u64) -> Self {
        self.failing_lookups.insert(number);
        self
    }

    pub fn failing_discussion(mut self) -> Self {
        self.failing_discussion = true;
        self
    }

    /// Number of listing pages requested so far.
    pub fn list_requests(&self) -> u32 {
        self.list_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceControl for StaticSource {
    async fn list_closed(
        &self,
        _repo: &RepoRef,
        page: u32,
        _per_page: u32,
    ) -> Result<Vec<RawChangeSet>, SourceError> {
        self.list_requests.fetch_add(1, Ordering::SeqCst);
        if self.failing_pages.contains(&page) {
            return Err(SourceError::Unavailable(format!("page {page} failed")));
        }
        let index = page.saturating_sub(1) as usize;
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }

    async fn get_change_set(
        &self,
        _repo: &RepoRef,
        number: u64,
    ) -> Result<Option<RawChangeSet>, SourceError> {
        if self.failing_lookups.contains(&number) {
            return Err(SourceError::Unavailable(format!(
                "lookup of #{number} failed"
            )));
        }
        Ok(self.change_sets.get(&number).cloned())
    }

    async fn list_files(&self, _repo: &RepoRef, number: u64) -> Result<Vec<RawFile>, SourceError> {
        Ok(self.files.get(&number).cloned().unwrap_or_default())
    }

    async fn list_discussion(
        &self,
        _repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<DiscussionEntry>, SourceError> {
        if self.failing_discussion {
            return Err(SourceError::Unavailable("discussion failed".to_owned()));
        }
        Ok(self.discussion.get(&number).cloned().unwrap_or_default())
    }

    async fn list_labeled_issues(
        &self,
        _repo: &RepoRef,
        _label: &str,
        _limit: u32,
    ) -> Result<Vec<RawIssue>, SourceError> {
        Ok(self.issues.clone())
    }
}
