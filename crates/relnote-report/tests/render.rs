use relnote_core::{
    Author, Category, ChangeSetRecord, GoodFirstIssue, NARRATIVE_UNAVAILABLE, ReportVariant,
};
use relnote_report::{ReportContext, assemble};

fn record(id: u64, title: &str, category: Option<Category>) -> ChangeSetRecord {
    let mut record = ChangeSetRecord::new(
        id,
        title,
        format!("https://github.com/acme/widget/pull/{id}"),
        Author {
            login: format!("dev{id}"),
            profile_url: format!("https://github.com/dev{id}"),
        },
    );
    record.category = category;
    record.summary_highlight = format!("highlight {id}");
    record.summary_value = format!("value {id}");
    record
}

fn context() -> ReportContext {
    ReportContext {
        title: "widget monthly report".to_owned(),
        window_label: Some("2025-05".to_owned()),
        ..ReportContext::default()
    }
}

#[test]
fn summary_renders_narrative_highlight_and_grouped_normal_entry()
-> Result<(), Box<dyn std::error::Error>> {
    let mut important = record(42, "feat(proxy): add retries", Some(Category::Feature)).flagged(true);
    important.set_narrative(
        "**Background**: A\n\n**Feature Details**: B\n\n**Usage**: C\n\n**Value**: D",
    )?;
    let normal = record(7, "fix: handle 404", Some(Category::Bugfix));

    let document = assemble(ReportVariant::Summary, &[normal, important], &context());

    assert!(document.starts_with("# widget monthly report\n\n## Overview\n\n"));
    assert!(document.contains("- [add retries](#highlights) ([#42]("));
    let highlights = document.find("## Highlights").ok_or("highlights")?;
    let full_list = document.find("## Full Change List").ok_or("full list")?;
    let statistics = document.find("## Statistics").ok_or("statistics")?;
    assert!(highlights < full_list && full_list < statistics);

    let highlight_section = &document[highlights..full_list];
    assert!(highlight_section.contains("### add retries"));
    assert!(highlight_section.contains("**Background**: A\n\n**Feature Details**: B"));
    assert!(highlight_section.contains("**Value**: D"));
    assert!(!highlight_section.contains("highlight 42"));

    let list_section = &document[full_list..statistics];
    assert!(list_section.contains("### 🐛 Bug Fixes"));
    assert!(list_section.contains("- **handle 404** ([#7](https://github.com/acme/widget/pull/7)) by [dev7](https://github.com/dev7)"));
    assert!(!list_section.contains("#42"));
    assert!(document.contains("**Total**: 2 changes (1 important)"));
    Ok(())
}

#[test]
fn failed_deep_dive_falls_back_to_short_pair() -> Result<(), Box<dyn std::error::Error>> {
    let mut important = record(9, "feat: cache", Some(Category::Feature)).flagged(true);
    important.set_narrative(NARRATIVE_UNAVAILABLE)?;

    let document = assemble(ReportVariant::Summary, &[important], &context());

    assert!(document.contains("**Highlight**: highlight 9"));
    assert!(document.contains("**Value**: value 9"));
    assert!(document.contains(&format!("_{NARRATIVE_UNAVAILABLE}_")));
    assert!(!document.contains("## Full Change List"));
    Ok(())
}

#[test]
fn empty_groups_are_omitted_and_unset_category_is_feature() {
    let records = [record(3, "chore: bump deps", None)];

    let document = assemble(ReportVariant::Summary, &records, &context());

    assert!(document.contains("### 🚀 Features"));
    assert!(!document.contains("Bug Fixes"));
    assert!(!document.contains("Testing"));
    assert!(!document.contains("## Highlights"));
}

#[test]
fn good_first_issues_section_is_optional() {
    let records = [record(3, "feat: a", Some(Category::Feature))];
    let mut with_issues = context();
    with_issues.good_first_issues = vec![GoodFirstIssue {
        title: "Improve docs".to_owned(),
        url: "https://github.com/acme/widget/issues/5".to_owned(),
        body: "Short description".to_owned(),
    }];

    let without = assemble(ReportVariant::Summary, &records, &context());
    let with = assemble(ReportVariant::Summary, &records, &with_issues);

    assert!(!without.contains("## Good First Issues"));
    assert!(with.contains("## Good First Issues\n\n### Improve docs"));
    assert!(with.contains("- Summary: Short description..."));
}

#[test]
fn summary_limit_never_cuts_flagged_records() {
    let mut records = vec![
        record(1, "feat: one", None),
        record(2, "feat: two", None),
        record(3, "feat: three", None).flagged(true),
    ];
    records[0].score = 10;
    records[1].score = 80;
    records[2].score = 0;
    let mut limited = context();
    limited.max_normal_entries = Some(1);

    let document = assemble(ReportVariant::Summary, &records, &limited);

    assert!(document.contains("[#2]"));
    assert!(document.contains("[#3]"));
    assert!(!document.contains("[#1]"));
}

#[test]
fn changelog_groups_all_records_compactly() {
    let records = [
        record(10, "fix: crash on start", Some(Category::Bugfix)).flagged(true),
        record(11, "docs: readme", Some(Category::Documentation)),
    ];
    let changelog_context = ReportContext {
        title: String::new(),
        ..ReportContext::default()
    };

    let document = assemble(ReportVariant::Changelog, &records, &changelog_context);

    assert!(document.starts_with("# Release Notes\n\n"));
    assert!(document.contains("### 🐛 Bug Fixes\n\n- **⭐ fix: crash on start** ([#10]"));
    assert!(document.contains("### 📚 Documentation\n\n- **docs: readme** ([#11]"));
    assert!(!document.contains("## Highlights"));
    assert_eq!(document.matches("  - Highlight: ").count(), 2);
    assert!(document.contains("**Total**: 2 changes (1 important)"));
}

#[test]
fn assembly_is_deterministic() {
    let records = [
        record(5, "feat: e", Some(Category::Refactor)),
        record(6, "feat: f", Some(Category::Refactor)),
    ];

    let first = assemble(ReportVariant::Summary, &records, &context());
    let second = assemble(ReportVariant::Summary, &records, &context());

    assert_eq!(first, second);
    let six = first.find("[#6]").unwrap_or(usize::MAX);
    let five = first.find("[#5]").unwrap_or(0);
    assert!(six < five);
}
