use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod ids;
mod window;

pub use ids::extract_change_set_ids;
pub use window::{MonthWindow, RetrievalWindow};

pub const FALLBACK_HIGHLIGHT: &str = "technical update";
pub const FALLBACK_VALUE: &str = "functional improvement";
pub const NARRATIVE_UNAVAILABLE: &str = "Detailed analysis unavailable.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Feature,
    Bugfix,
    Documentation,
    Refactor,
    Test,
}

impl Category {
    /// Render order used by every grouped section.
    pub const ORDER: [Category; 5] = [
        Category::Feature,
        Category::Bugfix,
        Category::Refactor,
        Category::Documentation,
        Category::Test,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bugfix => "bugfix",
            Self::Documentation => "documentation",
            Self::Refactor => "refactor",
            Self::Test => "test",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Feature => "Features",
            Self::Bugfix => "Bug Fixes",
            Self::Documentation => "Documentation",
            Self::Refactor => "Refactoring",
            Self::Test => "Testing",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Feature => "🚀",
            Self::Bugfix => "🐛",
            Self::Documentation => "📚",
            Self::Refactor => "♻️",
            Self::Test => "🧪",
        }
    }

    /// Maps model output onto a category, accepting the usual aliases.
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "feature" | "features" | "feat" | "enhancement" => Some(Self::Feature),
            "bugfix" | "bug" | "fix" | "bug_fix" | "bug-fix" => Some(Self::Bugfix),
            "documentation" | "doc" | "docs" => Some(Self::Documentation),
            "refactor" | "refactoring" | "perf" | "optimize" | "optimization" => {
                Some(Self::Refactor)
            }
            "test" | "tests" | "testing" | "ci" => Some(Self::Test),
            _ => None,
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(value).ok_or_else(|| {
            format!(
                "invalid category '{}', expected one of: feature, bugfix, documentation, refactor, test",
                value.trim()
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
    pub profile_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetRecord {
    pub id: u64,
    pub title: String,
    pub url: String,
    pub author: Author,
    pub merged_at: Option<DateTime<Utc>>,
    pub category: Option<Category>,
    pub score: u32,
    pub summary_highlight: String,
    pub summary_value: String,
    pub is_flagged_important: bool,
    deep_dive_narrative: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("change-set #{0} is not flagged important and cannot carry a narrative")]
    NotFlagged(u64),
    #[error("narrative for change-set #{0} is empty")]
    EmptyNarrative(u64),
}

impl ChangeSetRecord {
    pub fn new(id: u64, title: impl Into<String>, url: impl Into<String>, author: Author) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
            author,
            merged_at: None,
            category: None,
            score: 0,
            summary_highlight: String::new(),
            summary_value: String::new(),
            is_flagged_important: false,
            deep_dive_narrative: None,
        }
    }

    pub fn with_merged_at(mut self, merged_at: DateTime<Utc>) -> Self {
        self.merged_at = Some(merged_at);
        self
    }

    pub fn flagged(mut self, important: bool) -> Self {
        self.is_flagged_important = important;
        self
    }

    pub fn has_summary(&self) -> bool {
        !self.summary_highlight.trim().is_empty() && !self.summary_value.trim().is_empty()
    }

    /// Fills only the summary fields that are still empty with generic text.
    pub fn apply_summary_fallback(&mut self) {
        if self.summary_highlight.trim().is_empty() {
            self.summary_highlight = FALLBACK_HIGHLIGHT.to_owned();
        }
        if self.summary_value.trim().is_empty() {
            self.summary_value = FALLBACK_VALUE.to_owned();
        }
    }

    /// Category used for grouping; unclassified records land with features.
    pub fn effective_category(&self) -> Category {
        self.category.unwrap_or(Category::Feature)
    }

    pub fn set_narrative(&mut self, narrative: impl Into<String>) -> Result<(), RecordError> {
        if !self.is_flagged_important {
            return Err(RecordError::NotFlagged(self.id));
        }
        let narrative = narrative.into();
        if narrative.trim().is_empty() {
            return Err(RecordError::EmptyNarrative(self.id));
        }
        self.deep_dive_narrative = Some(narrative);
        Ok(())
    }

    /// Records a failed deep dive. Unflagged records are left untouched.
    pub fn mark_narrative_unavailable(&mut self) {
        if self.is_flagged_important {
            self.deep_dive_narrative = Some(NARRATIVE_UNAVAILABLE.to_owned());
        }
    }

    pub fn narrative(&self) -> Option<&str> {
        self.deep_dive_narrative.as_deref()
    }

    /// The narrative, unless deep dive failed and left the placeholder.
    pub fn available_narrative(&self) -> Option<&str> {
        self.narrative()
            .filter(|narrative| narrative.trim() != NARRATIVE_UNAVAILABLE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileChange {
    pub filename: String,
    pub additions: u64,
    pub deletions: u64,
    pub patch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscussionEntry {
    pub author: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSetDetail {
    pub body: String,
    pub total_changes: u64,
    pub files: Vec<FileChange>,
    pub discussion: Vec<DiscussionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodFirstIssue {
    pub title: String,
    pub url: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportVariant {
    Summary,
    Changelog,
}

impl ReportVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Changelog => "changelog",
        }
    }
}

/// Truncates on a char boundary, counting chars rather than bytes.
pub fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}
