use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use relnote_analysis::{
    ClassifyOutcome, Classifier, DeepDiveAnalyzer, DeepDiveOutcome, merge_flagged,
};
use relnote_config::RelnoteConfig;
use relnote_core::{
    ChangeSetRecord, GoodFirstIssue, MonthWindow, ReportVariant, RetrievalWindow,
};
use relnote_infer::TextGenerator;
use relnote_report::{ReportContext, Translator, assemble};
use relnote_source::{RepoRef, RetrievalPolicy, SourceControl, SourceControlClient};
use thiserror::Error;
use tracing::{Instrument, Span};

use crate::sink::DocumentSink;

pub const REPORT_FILE_NAME: &str = "report.md";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("repository owner is not set; pass --owner or set source.owner")]
    MissingOwner,
    #[error("repository name is not set; pass --repo or set source.repo")]
    MissingRepo,
    #[error("changelog needs at least one change-set id")]
    EmptyIdList,
    #[error("invalid month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("translation file suffix must not be empty")]
    EmptyTranslationSuffix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPlan {
    pub window: MonthWindow,
    pub important_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogPlan {
    pub ids: Vec<u64>,
    pub important_ids: Vec<u64>,
}

impl ChangelogPlan {
    /// Listed ids followed by important ids not already listed.
    pub fn requested_ids(&self) -> Vec<u64> {
        let mut seen = HashSet::new();
        self.ids
            .iter()
            .chain(self.important_ids.iter())
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportPlan {
    Summary(SummaryPlan),
    Changelog(ChangelogPlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub repo: RepoRef,
    pub plan: ReportPlan,
    pub translate: bool,
}

impl RunRequest {
    pub fn validate(&self, settings: &PipelineSettings) -> Result<(), RequestError> {
        if self.repo.owner.trim().is_empty() {
            return Err(RequestError::MissingOwner);
        }
        if self.repo.repo.trim().is_empty() {
            return Err(RequestError::MissingRepo);
        }
        match &self.plan {
            ReportPlan::Summary(plan) => {
                let MonthWindow { year, month } = plan.window;
                if MonthWindow::new(year, month).is_none() {
                    return Err(RequestError::InvalidMonth { year, month });
                }
            }
            ReportPlan::Changelog(plan) => {
                if plan.requested_ids().is_empty() {
                    return Err(RequestError::EmptyIdList);
                }
            }
        }
        if self.translate && settings.translation_suffix.trim().is_empty() {
            return Err(RequestError::EmptyTranslationSuffix);
        }
        Ok(())
    }
}

/// Report and translation knobs taken from the workspace config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub language: String,
    pub good_first_issue_label: String,
    pub good_first_issue_count: u32,
    pub max_normal_entries: Option<usize>,
    pub translation_language: String,
    pub translation_suffix: String,
    pub policy: RetrievalPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &RelnoteConfig) -> Self {
        Self {
            language: config.report.language.clone(),
            good_first_issue_label: config.report.good_first_issue_label.clone(),
            good_first_issue_count: config.report.good_first_issue_count,
            max_normal_entries: config.report.max_normal_entries,
            translation_language: config.translation.target_language.clone(),
            translation_suffix: config.translation.file_suffix.clone(),
            policy: RetrievalPolicy::from_config(&config.source),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&RelnoteConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retrieved {
    pub records: Vec<ChangeSetRecord>,
    pub good_first_issues: Vec<GoodFirstIssue>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisCounts {
    pub classified: usize,
    pub degraded: usize,
    pub skipped: usize,
    pub deep_dived: usize,
}

impl AnalysisCounts {
    fn record(&mut self, outcome: &ClassifyOutcome) {
        match outcome {
            ClassifyOutcome::Classified => self.classified += 1,
            ClassifyOutcome::Degraded(_) => self.degraded += 1,
            ClassifyOutcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub variant: ReportVariant,
    pub retrieved: usize,
    pub classified: usize,
    pub degraded: usize,
    pub skipped: usize,
    pub deep_dived: usize,
    pub truncated: bool,
    pub written: Vec<PathBuf>,
}

/// Components shared by the stages of one run.
pub struct Stages {
    pub source: Arc<SourceControlClient>,
    pub classifier: Arc<Classifier>,
    pub deep_dive: DeepDiveAnalyzer,
}

impl ReportPlan {
    pub fn variant(&self) -> ReportVariant {
        match self {
            Self::Summary(_) => ReportVariant::Summary,
            Self::Changelog(_) => ReportVariant::Changelog,
        }
    }

    pub fn window(&self) -> RetrievalWindow {
        match self {
            Self::Summary(plan) => RetrievalWindow::Month(plan.window),
            Self::Changelog(plan) => RetrievalWindow::Ids(plan.requested_ids()),
        }
    }

    fn include_discussion(&self) -> bool {
        matches!(self, Self::Summary(_))
    }

    pub async fn retrieve(&self, stages: &Stages, settings: &PipelineSettings) -> Retrieved {
        match self {
            Self::Summary(plan) => {
                let window = stages.source.list_in_window(plan.window).await;
                let mut records: Vec<ChangeSetRecord> = window
                    .items
                    .into_iter()
                    .map(|raw| raw.into_record())
                    .collect();
                let merge = merge_flagged(&mut records, &plan.important_ids, &stages.source).await;
                tracing::info!(
                    in_window = records.len() - merge.appended.len(),
                    appended = merge.appended.len(),
                    skipped = merge.skipped.len(),
                    "retrieved summary window"
                );
                let good_first_issues = stages
                    .source
                    .good_first_issues(
                        &settings.good_first_issue_label,
                        settings.good_first_issue_count,
                    )
                    .await;
                Retrieved {
                    records,
                    good_first_issues,
                    truncated: window.truncated,
                }
            }
            Self::Changelog(plan) => {
                let requested = plan.requested_ids();
                let records: Vec<ChangeSetRecord> = stages
                    .source
                    .get_many(&requested)
                    .await
                    .into_iter()
                    .map(|raw| {
                        let important = plan.important_ids.contains(&raw.number);
                        raw.into_record().flagged(important)
                    })
                    .collect();
                tracing::info!(
                    requested = requested.len(),
                    retrieved = records.len(),
                    "retrieved changelog ids"
                );
                Retrieved {
                    records,
                    ..Retrieved::default()
                }
            }
        }
    }

    /// Classifies every record in order; flagged records in a summary also
    /// get their deep-dive narrative.
    pub async fn analyze(&self, stages: &Stages, records: &mut [ChangeSetRecord]) -> AnalysisCounts {
        let mut counts = AnalysisCounts::default();
        for record in records.iter_mut() {
            let deep = matches!(self, Self::Summary(_)) && record.is_flagged_important;
            if !deep {
                let outcome = stages.classifier.analyze(record).await;
                counts.record(&outcome);
                continue;
            }
            match stages.deep_dive.deep_dive(record).await {
                DeepDiveOutcome::Narrated { classification } => {
                    counts.record(&classification);
                    counts.deep_dived += 1;
                }
                DeepDiveOutcome::Unavailable { classification, .. } => {
                    counts.record(&classification);
                }
                DeepDiveOutcome::NotFlagged => {}
            }
        }
        counts
    }

    pub fn render(&self, records: &[ChangeSetRecord], context: &ReportContext) -> String {
        assemble(self.variant(), records, context)
    }

    fn context(
        &self,
        repo: &RepoRef,
        settings: &PipelineSettings,
        good_first_issues: Vec<GoodFirstIssue>,
    ) -> ReportContext {
        match self {
            Self::Summary(plan) => ReportContext {
                title: format!("{} monthly report ({})", repo.slug(), plan.window.label()),
                window_label: self.window().label(),
                good_first_issues,
                max_normal_entries: settings.max_normal_entries,
            },
            Self::Changelog(_) => ReportContext::default(),
        }
    }
}

pub struct Pipeline {
    source: Arc<dyn SourceControl>,
    generator: Arc<dyn TextGenerator>,
    sink: Arc<dyn DocumentSink>,
    settings: PipelineSettings,
    span: Span,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn SourceControl>,
        generator: Arc<dyn TextGenerator>,
        sink: Arc<dyn DocumentSink>,
        settings: PipelineSettings,
        span: Span,
    ) -> Self {
        Self {
            source,
            generator,
            sink,
            settings,
            span,
        }
    }

    /// Retrieves, analyzes, renders and persists one report.
    ///
    /// Only an invalid request fails the run, and it does so before anything
    /// is fetched. Every later problem degrades the output instead.
    pub async fn run(&self, request: RunRequest) -> Result<RunSummary, RequestError> {
        request.validate(&self.settings)?;
        let stages = self.stages(&request);
        let plan = &request.plan;

        async {
            let mut retrieved = plan.retrieve(&stages, &self.settings).await;
            let counts = plan.analyze(&stages, &mut retrieved.records).await;
            let context = plan.context(&request.repo, &self.settings, retrieved.good_first_issues);
            let document = plan.render(&retrieved.records, &context);

            let mut written = Vec::new();
            self.persist(&document, REPORT_FILE_NAME, &mut written);
            if request.translate {
                let translator = Translator::new(
                    self.generator.clone(),
                    self.settings.translation_language.clone(),
                    tracing::info_span!(parent: &self.span, "translator"),
                );
                let translated = translator.translate(&document).await;
                let filename = format!("report.{}.md", self.settings.translation_suffix.trim());
                self.persist(&translated, &filename, &mut written);
            }

            let summary = RunSummary {
                variant: plan.variant(),
                retrieved: retrieved.records.len(),
                classified: counts.classified,
                degraded: counts.degraded,
                skipped: counts.skipped,
                deep_dived: counts.deep_dived,
                truncated: retrieved.truncated,
                written,
            };
            tracing::info!(
                variant = summary.variant.as_str(),
                retrieved = summary.retrieved,
                classified = summary.classified,
                degraded = summary.degraded,
                skipped = summary.skipped,
                deep_dived = summary.deep_dived,
                "report run finished"
            );
            Ok(summary)
        }
        .instrument(self.span.clone())
        .await
    }

    fn stages(&self, request: &RunRequest) -> Stages {
        let source = Arc::new(SourceControlClient::new(
            self.source.clone(),
            request.repo.clone(),
            self.settings.policy,
            tracing::info_span!(parent: &self.span, "source", repo = %request.repo.slug()),
        ));
        let classifier = Arc::new(Classifier::new(
            self.generator.clone(),
            source.clone(),
            request.plan.include_discussion(),
            self.settings.language.clone(),
            tracing::info_span!(parent: &self.span, "classifier"),
        ));
        let deep_dive = DeepDiveAnalyzer::new(
            classifier.clone(),
            tracing::info_span!(parent: &self.span, "deep_dive"),
        );
        Stages {
            source,
            classifier,
            deep_dive,
        }
    }

    fn persist(&self, content: &str, filename: &str, written: &mut Vec<PathBuf>) {
        match self.sink.persist(content, filename) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "wrote document");
                written.push(path);
            }
            Err(err) => {
                tracing::error!(filename, error = %err, "failed to write document");
            }
        }
    }
}
