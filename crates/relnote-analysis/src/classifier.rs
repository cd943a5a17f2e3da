use std::sync::Arc;

use relnote_core::{Category, ChangeSetDetail, ChangeSetRecord};
use relnote_infer::{
    GenerationRequest, InferError, ResponseShape, TextGenerator, extract_payload, text_field,
};
use relnote_source::{DetailProfile, SourceControlClient};
use serde_json::Value;
use thiserror::Error;
use tracing::{Instrument, Span};

use crate::prompts::classification_prompt;

const HIGHLIGHT_KEYS: &[&str] = &["highlight"];
const VALUE_KEYS: &[&str] = &["value", "function_value"];
const CATEGORY_KEYS: &[&str] = &["category", "pr_type"];

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("text generation failed: {0}")]
    Generation(#[from] InferError),
    #[error("unparseable model output: {0}")]
    Unparseable(String),
    #[error("model output is missing required key '{0}'")]
    MissingKey(&'static str),
    #[error("detail for change-set #{0} is unavailable")]
    DetailUnavailable(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub highlight: String,
    pub value: String,
    pub category: Option<Category>,
    pub score: Option<u32>,
}

impl Verdict {
    fn apply_to(self, record: &mut ChangeSetRecord) {
        record.summary_highlight = self.highlight;
        record.summary_value = self.value;
        if let Some(category) = self.category {
            record.category = Some(category);
        }
        if let Some(score) = self.score {
            record.score = score;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyOutcome {
    Classified,
    Skipped,
    Degraded(String),
}

pub struct Classifier {
    generator: Arc<dyn TextGenerator>,
    source: Arc<SourceControlClient>,
    include_discussion: bool,
    language: String,
    span: Span,
}

impl Classifier {
    /// `include_discussion` adds the review digest to every prompt.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        source: Arc<SourceControlClient>,
        include_discussion: bool,
        language: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            generator,
            source,
            include_discussion,
            language: language.into(),
            span,
        }
    }

    pub fn source(&self) -> &Arc<SourceControlClient> {
        &self.source
    }

    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Sends exactly one generation request and parses the verdict.
    pub async fn classify(
        &self,
        record: &ChangeSetRecord,
        detail: &ChangeSetDetail,
    ) -> Result<Verdict, ClassifyError> {
        let prompt =
            classification_prompt(record, detail, self.include_discussion, &self.language);
        let text = self
            .generator
            .generate(&GenerationRequest::user(prompt, ResponseShape::Json))
            .await?;
        parse_verdict(&text)
    }

    /// Classifies `record` in place, degrading to fallback text on any failure.
    ///
    /// A record that already has both summary fields is left alone. On
    /// failure only the empty summary fields are filled; category and score
    /// keep whatever they held.
    pub async fn analyze(&self, record: &mut ChangeSetRecord) -> ClassifyOutcome {
        let span = self.span.clone();
        async {
            if record.has_summary() {
                tracing::debug!(number = record.id, "summary already present, skipping");
                return ClassifyOutcome::Skipped;
            }

            match self.fetch_and_classify(record).await {
                Ok(verdict) => {
                    verdict.apply_to(record);
                    tracing::info!(
                        number = record.id,
                        category = record.effective_category().as_str(),
                        score = record.score,
                        "classified change-set"
                    );
                    ClassifyOutcome::Classified
                }
                Err(err) => {
                    tracing::warn!(number = record.id, error = %err, "classification degraded to fallback summary");
                    record.apply_summary_fallback();
                    ClassifyOutcome::Degraded(err.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn fetch_and_classify(&self, record: &ChangeSetRecord) -> Result<Verdict, ClassifyError> {
        let detail = self
            .source
            .get_detail(record.id, DetailProfile::standard(self.include_discussion))
            .await
            .ok_or(ClassifyError::DetailUnavailable(record.id))?;
        self.classify(record, &detail).await
    }
}

pub fn parse_verdict(text: &str) -> Result<Verdict, ClassifyError> {
    let map = extract_payload(text)
        .into_structured()
        .map_err(ClassifyError::Unparseable)?;

    let highlight = text_field(&map, HIGHLIGHT_KEYS).ok_or(ClassifyError::MissingKey("highlight"))?;
    let value = text_field(&map, VALUE_KEYS).ok_or(ClassifyError::MissingKey("value"))?;
    let category = text_field(&map, CATEGORY_KEYS).and_then(|raw| Category::parse_lenient(&raw));
    let score = map.get("score").map(coerce_score);

    Ok(Verdict {
        highlight,
        value,
        category,
        score,
    })
}

/// Integer numbers and integer strings pass; anything else scores zero.
pub fn coerce_score(value: &Value) -> u32 {
    match value {
        Value::Number(number) => number
            .as_u64()
            .and_then(|score| u32::try_from(score).ok())
            .unwrap_or(0),
        Value::String(raw) => raw.trim().parse::<u32>().unwrap_or(0),
        _ => 0,
    }
}
