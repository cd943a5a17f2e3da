use std::cmp::Reverse;

use relnote_core::{
    Author, Category, ChangeSetRecord, GoodFirstIssue, NARRATIVE_UNAVAILABLE, ReportVariant,
    truncate_chars,
};

pub const FEATURE_UPDATE_TITLE: &str = "Feature update";

const MAX_TITLE_CHARS: usize = 30;
const CONVENTIONAL_PREFIXES: &[&str] = &[
    "feat", "fix", "docs", "style", "refactor", "test", "chore",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportContext {
    pub title: String,
    pub window_label: Option<String>,
    pub good_first_issues: Vec<GoodFirstIssue>,
    /// Keeps only the N best-scored un-flagged records in the full list.
    pub max_normal_entries: Option<usize>,
}

type Group<'a> = (Category, Vec<&'a ChangeSetRecord>);

/// Renders analyzed records into the markdown document for `variant`.
pub fn assemble(
    variant: ReportVariant,
    records: &[ChangeSetRecord],
    context: &ReportContext,
) -> String {
    match variant {
        ReportVariant::Summary => render_summary(records, context),
        ReportVariant::Changelog => render_changelog(records, context),
    }
}

/// Fixed category order, descending id within a group, empty groups omitted.
pub fn group_by_category<'a>(records: &[&'a ChangeSetRecord]) -> Vec<Group<'a>> {
    Category::ORDER
        .iter()
        .filter_map(|&category| {
            let mut group: Vec<&ChangeSetRecord> = records
                .iter()
                .copied()
                .filter(|record| record.effective_category() == category)
                .collect();
            if group.is_empty() {
                return None;
            }
            group.sort_by_key(|record| Reverse(record.id));
            Some((category, group))
        })
        .collect()
}

/// Top `limit` records by score, ties broken by descending id.
pub fn select_normal_entries<'a>(
    mut records: Vec<&'a ChangeSetRecord>,
    limit: Option<usize>,
) -> Vec<&'a ChangeSetRecord> {
    if let Some(limit) = limit {
        records.sort_by_key(|record| (Reverse(record.score), Reverse(record.id)));
        records.truncate(limit);
    }
    records
}

/// Drops a conventional-commit prefix and shortens the title for headings.
pub fn clean_title(title: &str) -> String {
    let cleaned = strip_conventional_prefix(title.trim());
    if cleaned.is_empty() {
        return FEATURE_UPDATE_TITLE.to_owned();
    }
    if cleaned.chars().count() > MAX_TITLE_CHARS {
        return format!("{}...", truncate_chars(cleaned, MAX_TITLE_CHARS));
    }
    cleaned.to_owned()
}

fn strip_conventional_prefix(title: &str) -> &str {
    let lower = title.to_ascii_lowercase();
    for prefix in CONVENTIONAL_PREFIXES {
        if !lower.starts_with(prefix) {
            continue;
        }
        let mut rest = &title[prefix.len()..];
        if rest.starts_with('(') {
            let Some(end) = rest.find(')') else {
                continue;
            };
            rest = &rest[end + 1..];
        }
        let rest = rest.strip_prefix('!').unwrap_or(rest);
        if let Some(remainder) = rest.strip_prefix(':') {
            return remainder.trim();
        }
    }
    title
}

fn render_summary(records: &[ChangeSetRecord], context: &ReportContext) -> String {
    let mut important: Vec<&ChangeSetRecord> = records
        .iter()
        .filter(|record| record.is_flagged_important)
        .collect();
    important.sort_by_key(|record| Reverse(record.id));
    let normal = select_normal_entries(
        records
            .iter()
            .filter(|record| !record.is_flagged_important)
            .collect(),
        context.max_normal_entries,
    );
    let included: Vec<&ChangeSetRecord> = important.iter().chain(normal.iter()).copied().collect();

    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", context.title));

    out.push_str("## Overview\n\n");
    if let Some(label) = &context.window_label {
        out.push_str(&format!("Period: **{label}**\n\n"));
    }
    out.push_str(&format!(
        "This period includes **{}** merged changes.\n\n",
        included.len()
    ));
    push_category_counts(&mut out, &group_by_category(&included));
    if !important.is_empty() {
        out.push_str("Featured this period:\n\n");
        for record in &important {
            out.push_str(&format!(
                "- [{}](#highlights) ([#{}]({}))\n",
                clean_title(&record.title),
                record.id,
                record.url
            ));
        }
        out.push('\n');
    }

    if !context.good_first_issues.is_empty() {
        out.push_str("## Good First Issues\n\n");
        for issue in &context.good_first_issues {
            out.push_str(&format!("### {}\n\n", issue.title));
            out.push_str(&format!("- Issue: {}\n", issue.url));
            if !issue.body.is_empty() {
                out.push_str(&format!("- Summary: {}...\n", issue.body));
            }
            out.push('\n');
        }
    }

    if !important.is_empty() {
        out.push_str("## Highlights\n\n");
        for record in &important {
            push_highlight_entry(&mut out, record);
        }
    }

    if !normal.is_empty() {
        out.push_str("## Full Change List\n\n");
        for (category, group) in group_by_category(&normal) {
            out.push_str(&format!("### {} {}\n\n", category.emoji(), category.display_name()));
            for record in group {
                push_compact_entry(&mut out, record, &clean_title(&record.title));
            }
            out.push('\n');
        }
    }

    push_statistics(&mut out, &included);
    out
}

fn render_changelog(records: &[ChangeSetRecord], context: &ReportContext) -> String {
    let all: Vec<&ChangeSetRecord> = records.iter().collect();

    let mut out = String::new();
    out.push_str("# Release Notes\n\n");
    if let Some(label) = &context.window_label {
        out.push_str(&format!("Period: **{label}**\n\n"));
    }
    out.push_str(&format!("This release includes **{}** changes.\n\n", all.len()));

    let groups = group_by_category(&all);
    if !groups.is_empty() {
        out.push_str("## Changes\n\n");
        for (category, group) in groups {
            out.push_str(&format!("### {} {}\n\n", category.emoji(), category.display_name()));
            for record in group {
                let title = if record.is_flagged_important {
                    format!("⭐ {}", record.title.trim())
                } else {
                    record.title.trim().to_owned()
                };
                push_compact_entry(&mut out, record, &title);
            }
            out.push('\n');
        }
    }

    push_statistics(&mut out, &all);
    out
}

fn push_highlight_entry(out: &mut String, record: &ChangeSetRecord) {
    out.push_str(&format!("### {}\n\n", clean_title(&record.title)));
    out.push_str(&format!(
        "**Change-set**: [#{}]({}) | **Contributor**: {}\n\n",
        record.id,
        record.url,
        contributor(&record.author)
    ));
    match record.available_narrative() {
        Some(narrative) => {
            out.push_str(&format!("{}\n\n", narrative.trim()));
        }
        None => {
            out.push_str(&format!("**Highlight**: {}\n\n", record.summary_highlight));
            out.push_str(&format!("**Value**: {}\n\n", record.summary_value));
            if record.narrative().is_some() {
                out.push_str(&format!("_{NARRATIVE_UNAVAILABLE}_\n\n"));
            }
        }
    }
    out.push_str("---\n\n");
}

fn push_compact_entry(out: &mut String, record: &ChangeSetRecord, title: &str) {
    out.push_str(&format!(
        "- **{title}** ([#{}]({})) by {}\n",
        record.id,
        record.url,
        contributor(&record.author)
    ));
    out.push_str(&format!("  - Highlight: {}\n", record.summary_highlight));
    out.push_str(&format!("  - Value: {}\n", record.summary_value));
}

fn push_category_counts(out: &mut String, groups: &[Group<'_>]) {
    if groups.is_empty() {
        return;
    }
    for (category, group) in groups {
        out.push_str(&format!(
            "- {} {}: {}\n",
            category.emoji(),
            category.display_name(),
            group.len()
        ));
    }
    out.push('\n');
}

fn push_statistics(out: &mut String, records: &[&ChangeSetRecord]) {
    out.push_str("## Statistics\n\n");
    push_category_counts(out, &group_by_category(records));
    let important = records
        .iter()
        .filter(|record| record.is_flagged_important)
        .count();
    out.push_str(&format!("**Total**: {} changes", records.len()));
    if important > 0 {
        out.push_str(&format!(" ({important} important)"));
    }
    out.push('\n');
}

fn contributor(author: &Author) -> String {
    match (author.login.trim(), author.profile_url.trim()) {
        ("", _) => "unknown".to_owned(),
        (login, "") => login.to_owned(),
        (login, profile) => format!("[{login}]({profile})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, category: Option<Category>) -> ChangeSetRecord {
        let mut record = ChangeSetRecord::new(
            id,
            format!("feat: change {id}"),
            format!("https://github.com/acme/widget/pull/{id}"),
            Author {
                login: "octo".to_owned(),
                profile_url: "https://github.com/octo".to_owned(),
            },
        );
        record.category = category;
        record.summary_highlight = format!("highlight {id}");
        record.summary_value = format!("value {id}");
        record
    }

    #[test]
    fn clean_title_strips_prefixes_and_truncates() {
        assert_eq!(clean_title("feat: add retries"), "add retries");
        assert_eq!(clean_title("Fix(api)!: handle 404"), "handle 404");
        assert_eq!(clean_title("docs:"), FEATURE_UPDATE_TITLE);
        assert_eq!(clean_title("fixup the thing"), "fixup the thing");
        assert_eq!(
            clean_title("refactor: split the enormous request pipeline module"),
            "split the enormous request pip..."
        );
    }

    #[test]
    fn grouping_orders_categories_and_ids() {
        let records = [
            record(1, Some(Category::Test)),
            record(5, None),
            record(3, Some(Category::Feature)),
            record(4, Some(Category::Bugfix)),
        ];
        let refs: Vec<&ChangeSetRecord> = records.iter().collect();

        let groups = group_by_category(&refs);

        let shape: Vec<(Category, Vec<u64>)> = groups
            .iter()
            .map(|(category, group)| (*category, group.iter().map(|record| record.id).collect()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (Category::Feature, vec![5, 3]),
                (Category::Bugfix, vec![4]),
                (Category::Test, vec![1]),
            ]
        );
        assert_eq!(group_by_category(&refs), groups);
    }

    #[test]
    fn normal_entry_limit_keeps_best_scores() {
        let mut records = vec![
            record(1, None),
            record(2, None),
            record(3, None),
        ];
        records[0].score = 90;
        records[1].score = 40;
        records[2].score = 90;
        let refs: Vec<&ChangeSetRecord> = records.iter().collect();

        let kept: Vec<u64> = select_normal_entries(refs.clone(), Some(2))
            .iter()
            .map(|record| record.id)
            .collect();

        assert_eq!(kept, vec![3, 1]);
        assert_eq!(select_normal_entries(refs, None).len(), 3);
    }

    #[test]
    fn contributor_handles_missing_fields() {
        assert_eq!(contributor(&Author::default()), "unknown");
        assert_eq!(
            contributor(&Author {
                login: "octo".to_owned(),
                profile_url: String::new()
            }),
            "octo"
        );
    }
}
