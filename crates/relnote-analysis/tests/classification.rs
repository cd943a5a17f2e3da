use std::sync::Arc;

use chrono::{DateTime, Utc};
use relnote_analysis::{
    ClassifyOutcome, Classifier, DeepDiveAnalyzer, DeepDiveOutcome, merge_flagged,
};
use relnote_core::{
    Author, Category, ChangeSetRecord, FALLBACK_HIGHLIGHT, FALLBACK_VALUE, NARRATIVE_UNAVAILABLE,
};
use relnote_infer::{InferError, ScriptedGenerator, TextGenerator};
use relnote_source::{
    RawChangeSet, RawFile, RepoRef, RetrievalPolicy, SourceControlClient, StaticSource,
};
use tracing::Span;

fn merged_at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-05-10T08:00:00Z")
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_default()
}

fn raw(number: u64) -> RawChangeSet {
    RawChangeSet {
        number,
        title: format!("feat: change {number}"),
        html_url: format!("https://github.com/acme/widget/pull/{number}"),
        author: Author {
            login: "octo".to_owned(),
            profile_url: "https://github.com/octo".to_owned(),
        },
        merged_at: Some(merged_at()),
        draft: false,
        body: "Adds retries to the HTTP client.".to_owned(),
    }
}

fn source_with(numbers: &[u64]) -> StaticSource {
    let mut source = StaticSource::new();
    for &number in numbers {
        source = source.with_change_set(raw(number)).with_files(
            number,
            vec![RawFile {
                filename: "src/client.rs".to_owned(),
                additions: 30,
                deletions: 4,
                patch: Some("+fn retry() {}\n-fn once() {}".to_owned()),
            }],
        );
    }
    source
}

fn client(source: StaticSource) -> Arc<SourceControlClient> {
    Arc::new(SourceControlClient::new(
        Arc::new(source),
        RepoRef::new("acme", "widget"),
        RetrievalPolicy::default(),
        Span::none(),
    ))
}

fn classifier(generator: Arc<ScriptedGenerator>, source: Arc<SourceControlClient>) -> Classifier {
    let generator: Arc<dyn TextGenerator> = generator;
    Classifier::new(generator, source, true, "English", Span::none())
}

#[tokio::test]
async fn analyze_applies_verdict_with_single_request() -> Result<(), Box<dyn std::error::Error>> {
    let generator = Arc::new(ScriptedGenerator::with_responses([
        r#"{"highlight":"exponential backoff","value":"fewer failed calls","category":"feature","score":91}"#,
    ]));
    let classifier = classifier(generator.clone(), client(source_with(&[1])));
    let mut record = raw(1).into_record();

    let outcome = classifier.analyze(&mut record).await;

    assert_eq!(outcome, ClassifyOutcome::Classified);
    assert_eq!(record.summary_highlight, "exponential backoff");
    assert_eq!(record.category, Some(Category::Feature));
    assert_eq!(record.score, 91);
    assert_eq!(generator.request_count(), 1);
    let prompt = generator.requests()[0]
        .last_user_message()
        .ok_or("prompt")?
        .to_owned();
    assert!(prompt.contains("Total changed lines: 34"));
    Ok(())
}

#[tokio::test]
async fn invalid_output_falls_back_and_next_record_still_classifies() {
    let generator = Arc::new(ScriptedGenerator::with_responses([
        "not valid output",
        r#"{"highlight":"h2","value":"v2","category":"docs","score":"12"}"#,
    ]));
    let classifier = classifier(generator.clone(), client(source_with(&[1, 2])));
    let mut first = raw(1).into_record();
    first.category = Some(Category::Refactor);
    first.score = 7;
    let mut second = raw(2).into_record();

    let first_outcome = classifier.analyze(&mut first).await;
    let second_outcome = classifier.analyze(&mut second).await;

    assert!(matches!(first_outcome, ClassifyOutcome::Degraded(_)));
    assert_eq!(first.summary_highlight, FALLBACK_HIGHLIGHT);
    assert_eq!(first.summary_value, FALLBACK_VALUE);
    assert_eq!(first.category, Some(Category::Refactor));
    assert_eq!(first.score, 7);

    assert_eq!(second_outcome, ClassifyOutcome::Classified);
    assert_eq!(second.category, Some(Category::Documentation));
    assert_eq!(second.score, 12);
}

#[tokio::test]
async fn degraded_record_is_not_reclassified() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push_err(InferError::InvalidResponse("offline".to_owned()));
    let classifier = classifier(generator.clone(), client(source_with(&[1])));
    let mut record = raw(1).into_record();

    let first = classifier.analyze(&mut record).await;
    let snapshot = record.clone();
    let second = classifier.analyze(&mut record).await;

    assert!(matches!(first, ClassifyOutcome::Degraded(_)));
    assert_eq!(second, ClassifyOutcome::Skipped);
    assert_eq!(record, snapshot);
    assert_eq!(generator.request_count(), 1);
}

#[tokio::test]
async fn missing_detail_degrades_without_a_request() {
    let generator = Arc::new(ScriptedGenerator::new());
    let classifier = classifier(generator.clone(), client(StaticSource::new()));
    let mut record = raw(404).into_record();

    let outcome = classifier.analyze(&mut record).await;

    assert!(matches!(outcome, ClassifyOutcome::Degraded(_)));
    assert_eq!(generator.request_count(), 0);
    assert_eq!(record.summary_value, FALLBACK_VALUE);
}

#[tokio::test]
async fn deep_dive_joins_sections_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let generator = Arc::new(ScriptedGenerator::with_responses([
        r#"{"highlight":"h","value":"v","category":"feature","score":100}"#,
        r#"{"value_proposition":"D","usage_guide":"C","feature_details":"B","usage_background":"A"}"#,
    ]));
    let classifier = Arc::new(classifier(generator.clone(), client(source_with(&[5]))));
    let analyzer = DeepDiveAnalyzer::new(classifier, Span::none());
    let mut record = raw(5).into_record().flagged(true);

    let outcome = analyzer.deep_dive(&mut record).await;

    assert_eq!(
        outcome,
        DeepDiveOutcome::Narrated {
            classification: ClassifyOutcome::Classified
        }
    );
    assert_eq!(
        record.narrative(),
        Some("**Background**: A\n\n**Feature Details**: B\n\n**Usage**: C\n\n**Value**: D")
    );
    let deep_prompt = generator.requests()[1]
        .last_user_message()
        .ok_or("prompt")?
        .to_owned();
    assert!(deep_prompt.contains("fn retry() {}"));
    Ok(())
}

#[tokio::test]
async fn deep_dive_omits_absent_and_blank_sections() {
    let generator = Arc::new(ScriptedGenerator::with_responses([
        r#"{"highlight":"h","value":"v","score":40}"#,
        r#"{"feature_details":"B","usage_guide":"   ","value_proposition":"D"}"#,
    ]));
    let classifier = Arc::new(classifier(generator, client(source_with(&[7]))));
    let analyzer = DeepDiveAnalyzer::new(classifier, Span::none());
    let mut record = raw(7).into_record().flagged(true);

    let outcome = analyzer.deep_dive(&mut record).await;

    assert!(matches!(outcome, DeepDiveOutcome::Narrated { .. }));
    let narrative = record.narrative().unwrap_or_default();
    assert_eq!(narrative, "**Feature Details**: B\n\n**Value**: D");
    assert!(!narrative.contains("Background"));
    assert!(!narrative.contains("Usage"));
}

#[tokio::test]
async fn deep_dive_failure_keeps_classification_and_sets_placeholder() {
    let generator = Arc::new(ScriptedGenerator::with_responses([
        r#"{"highlight":"h","value":"v","score":60}"#,
        r#"{"unrelated":"x"}"#,
    ]));
    let classifier = Arc::new(classifier(generator, client(source_with(&[6]))));
    let analyzer = DeepDiveAnalyzer::new(classifier, Span::none());
    let mut record = raw(6).into_record().flagged(true);

    let outcome = analyzer.deep_dive(&mut record).await;

    assert!(matches!(outcome, DeepDiveOutcome::Unavailable { .. }));
    assert_eq!(record.narrative(), Some(NARRATIVE_UNAVAILABLE));
    assert_eq!(record.summary_highlight, "h");
    assert_eq!(record.score, 60);
}

#[tokio::test]
async fn deep_dive_ignores_unflagged_records() {
    let generator = Arc::new(ScriptedGenerator::new());
    let classifier = Arc::new(classifier(generator.clone(), client(source_with(&[1]))));
    let analyzer = DeepDiveAnalyzer::new(classifier, Span::none());
    let mut record: ChangeSetRecord = raw(1).into_record();

    assert_eq!(analyzer.deep_dive(&mut record).await, DeepDiveOutcome::NotFlagged);
    assert_eq!(generator.request_count(), 0);
    assert_eq!(record.narrative(), None);
}

#[tokio::test]
async fn merge_marks_present_and_appends_only_eligible_missing_ids() {
    let mut draft = raw(30);
    draft.draft = true;
    let source = client(source_with(&[20]).with_change_set(draft));
    let mut records = vec![raw(10).into_record()];

    let report = merge_flagged(&mut records, &[10, 20, 30, 40, 20], &source).await;

    let ids: Vec<u64> = records.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![10, 20]);
    assert!(records.iter().all(|record| record.is_flagged_important));
    assert_eq!(report.marked, vec![10]);
    assert_eq!(report.appended, vec![20]);
    assert_eq!(report.skipped, vec![30, 40]);
}
