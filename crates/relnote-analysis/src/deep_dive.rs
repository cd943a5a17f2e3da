use std::sync::Arc;

use relnote_core::{ChangeSetRecord, FileChange};
use relnote_infer::{GenerationRequest, ResponseShape, extract_payload, text_field};
use relnote_source::{DetailProfile, SourceControlClient};
use tracing::{Instrument, Span};

use crate::classifier::{ClassifyError, ClassifyOutcome, Classifier};
use crate::prompts::deep_dive_prompt;

pub const MAX_DIGEST_FILES: usize = 5;
pub const MAX_KEY_LINES_PER_FILE: usize = 6;

const COMMENT_MARKERS: &[&str] = &["//", "#", "/*", "*/", "*", "--", "<!--", "-->"];

/// Narrative sections in render order, with their bold labels.
const SECTIONS: [(&str, &str); 4] = [
    ("usage_background", "Background"),
    ("feature_details", "Feature Details"),
    ("usage_guide", "Usage"),
    ("value_proposition", "Value"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepDiveOutcome {
    Narrated { classification: ClassifyOutcome },
    Unavailable { classification: ClassifyOutcome, reason: String },
    NotFlagged,
}

pub struct DeepDiveAnalyzer {
    classifier: Arc<Classifier>,
    span: Span,
}

impl DeepDiveAnalyzer {
    pub fn new(classifier: Arc<Classifier>, span: Span) -> Self {
        Self { classifier, span }
    }

    /// Classifies a flagged record, then attaches its long-form narrative.
    ///
    /// Any failure past classification leaves the unavailable placeholder as
    /// the narrative while keeping the classification result.
    pub async fn deep_dive(&self, record: &mut ChangeSetRecord) -> DeepDiveOutcome {
        if !record.is_flagged_important {
            return DeepDiveOutcome::NotFlagged;
        }

        let classification = self.classifier.analyze(record).await;

        let span = self.span.clone();
        async {
            match self.narrate(record).await {
                Ok(narrative) => {
                    if let Err(err) = record.set_narrative(narrative) {
                        tracing::warn!(number = record.id, error = %err, "narrative rejected");
                        return mark_unavailable(record, classification, err.to_string());
                    }
                    tracing::info!(number = record.id, "attached deep-dive narrative");
                    DeepDiveOutcome::Narrated { classification }
                }
                Err(err) => {
                    tracing::warn!(number = record.id, error = %err, "deep dive unavailable");
                    mark_unavailable(record, classification, err.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn narrate(&self, record: &ChangeSetRecord) -> Result<String, ClassifyError> {
        let detail = self
            .classifier
            .source()
            .get_detail(record.id, DetailProfile::deep_dive())
            .await
            .ok_or(ClassifyError::DetailUnavailable(record.id))?;

        let digest = patch_digest(&detail.files);
        let prompt = deep_dive_prompt(record, &detail, &digest, self.classifier.language());
        let text = self
            .classifier
            .generator()
            .generate(&GenerationRequest::user(prompt, ResponseShape::Json))
            .await?;

        let map = extract_payload(&text)
            .into_structured()
            .map_err(ClassifyError::Unparseable)?;

        let sections: Vec<String> = SECTIONS
            .iter()
            .filter_map(|(key, label)| {
                text_field(&map, &[*key]).map(|body| format!("**{label}**: {body}"))
            })
            .collect();
        if sections.is_empty() {
            return Err(ClassifyError::MissingKey("usage_background"));
        }
        Ok(sections.join("\n\n"))
    }
}

fn mark_unavailable(
    record: &mut ChangeSetRecord,
    classification: ClassifyOutcome,
    reason: String,
) -> DeepDiveOutcome {
    record.mark_narrative_unavailable();
    DeepDiveOutcome::Unavailable {
        classification,
        reason,
    }
}

/// Added and removed lines worth showing, per file.
///
/// Diff headers, blank lines and lone comment markers are dropped; at most
/// six lines per file and five files are kept.
pub fn patch_digest(files: &[FileChange]) -> String {
    let mut out = String::new();
    for file in files
        .iter()
        .filter(|file| !file.patch.trim().is_empty())
        .take(MAX_DIGEST_FILES)
    {
        let key_lines: Vec<&str> = file
            .patch
            .lines()
            .filter(|line| {
                (line.starts_with('+') && !line.starts_with("+++"))
                    || (line.starts_with('-') && !line.starts_with("---"))
            })
            .map(|line| line[1..].trim())
            .filter(|line| !line.is_empty() && !COMMENT_MARKERS.contains(line))
            .take(MAX_KEY_LINES_PER_FILE)
            .collect();
        if key_lines.is_empty() {
            continue;
        }
        out.push_str(&format!("{}:\n", file.filename));
        for line in key_lines {
            out.push_str(&format!("  {line}\n"));
        }
    }
    if out.is_empty() {
        out.push_str("(no key code changes)\n");
    }
    out
}

/// Outcome of folding flagged ids into a windowed collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub marked: Vec<u64>,
    pub appended: Vec<u64>,
    pub skipped: Vec<u64>,
}

/// Marks flagged records already present and fetches the missing ones.
///
/// A fetched record is appended only when it is merged and not a draft.
/// No id ever appears twice in `records`.
pub async fn merge_flagged(
    records: &mut Vec<ChangeSetRecord>,
    flagged_ids: &[u64],
    source: &SourceControlClient,
) -> MergeReport {
    let mut report = MergeReport::default();
    for &id in flagged_ids {
        if report.marked.contains(&id)
            || report.appended.contains(&id)
            || report.skipped.contains(&id)
        {
            continue;
        }
        if let Some(existing) = records.iter_mut().find(|record| record.id == id) {
            existing.is_flagged_important = true;
            report.marked.push(id);
            continue;
        }
        match source.get_by_id(id).await {
            Some(raw) if raw.is_eligible() => {
                records.push(raw.into_record().flagged(true));
                report.appended.push(id);
            }
            Some(_) => {
                tracing::info!(number = id, "flagged change-set is unmerged or a draft, skipping");
                report.skipped.push(id);
            }
            None => {
                tracing::info!(number = id, "flagged change-set could not be retrieved, skipping");
                report.skipped.push(id);
            }
        }
    }
    report
}
