
use relnote_core::{ChangeSetDetail, ChangeSetRecord, DiscussionEntry, FileChange, truncate_chars};

pub const MAX_BODY_CHARS: usize = 500;
pub const MAX_PROMPT_FILES: usize = 5;
pub const MAX_DISCUSSION_ENTRIES: usize = 5;
pub const DISCUSSION_ENTRY_CHARS: usize = 200;

const SCORING_RUBRIC: &str = "\
Scoring (integer, 1-129):
- Technical complexity, up to 50: core architecture, new algorithms and new features score high; config tweaks, docs and tests score low.
- User impact, up to 40: changes that affect every user score high; internal changes score low.
- Code size, up to 30: under 10 changed lines is never a highlight; 10-100 lines at most 25.
- Bug severity, up to 9: only for fixes.
Documentation changes stay below 30 and test changes below 40.";

/// Prompt for the one-shot classification request.
///
/// The discussion digest is only included when `with_discussion` is set.
pub fn classification_prompt(
    record: &ChangeSetRecord,
    detail: &ChangeSetDetail,
    with_discussion: bool,
    language: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a release-notes editor. Classify and score the change-set below.\n\n");
    prompt.push_str(&format!("{SCORING_RUBRIC}\n\n"));
    push_change_set_facts(&mut prompt, record, detail);
    prompt.push_str(&format!("Changed files:\n{}\n", file_summaries(&detail.files)));
    if with_discussion {
        prompt.push_str(&format!(
            "Discussion digest:\n{}\n",
            discussion_digest(&detail.discussion)
        ));
    }
    prompt.push_str(&format!(
        "Write all text values in {language}. Reply with a single JSON object and nothing else:\n\
{{\"highlight\": \"how the change works, one or two sentences\", \
\"value\": \"what it brings to users, one or two sentences\", \
\"category\": \"feature | bugfix | documentation | refactor | test\", \
\"score\": 0}}"
    ));
    prompt
}

/// Prompt for the four-section narrative of an important change-set.
pub fn deep_dive_prompt(
    record: &ChangeSetRecord,
    detail: &ChangeSetDetail,
    patch_digest: &str,
    language: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a technical writer. Produce an in-depth feature write-up for the important change-set below, grounded in the code changes and the review discussion.\n\n");
    push_change_set_facts(&mut prompt, record, detail);
    prompt.push_str(&format!("Main changed files:\n{}\n", file_summaries(&detail.files)));
    prompt.push_str(&format!("Key code changes:\n{patch_digest}\n\n"));
    prompt.push_str(&format!(
        "Discussion digest:\n{}\n",
        discussion_digest(&detail.discussion)
    ));
    prompt.push_str(&format!(
        "Write all text values in {language}. Reply with a single JSON object and nothing else:\n\
{{\"usage_background\": \"the problem solved and who needs it\", \
\"feature_details\": \"what was implemented and how\", \
\"usage_guide\": \"how to enable and use it\", \
\"value_proposition\": \"concrete benefits for users\"}}"
    ));
    prompt
}

fn push_change_set_facts(prompt: &mut String, record: &ChangeSetRecord, detail: &ChangeSetDetail) {
    let body = detail.body.trim();
    prompt.push_str(&format!("Number: #{}\n", record.id));
    prompt.push_str(&format!("Title: {}\n", record.title));
    prompt.push_str(&format!(
        "Description: {}\n",
        if body.is_empty() {
            "(none)"
        } else {
            truncate_chars(body, MAX_BODY_CHARS)
        }
    ));
    prompt.push_str(&format!("Total changed lines: {}\n\n", detail.total_changes));
}

pub fn file_summaries(files: &[FileChange]) -> String {
    if files.is_empty() {
        return "(no file changes available)\n".to_owned();
    }
    let mut out = String::new();
    for file in files.iter().take(MAX_PROMPT_FILES) {
        out.push_str(&format!(
            "- {} (+{} -{})\n",
            file.filename, file.additions, file.deletions
        ));
        let patch = file.patch.trim();
        if !patch.is_empty() {
            out.push_str(&format!("  patch excerpt:\n{patch}\n"));
        }
    }
    out
}

pub fn discussion_digest(entries: &[DiscussionEntry]) -> String {
    if entries.is_empty() {
        return "(no discussion)\n".to_owned();
    }
    let mut out = String::new();
    for entry in entries.iter().take(MAX_DISCUSSION_ENTRIES) {
        let author = if entry.author.is_empty() {
            "unknown"
        } else {
            entry.author.as_str()
        };
        out.push_str(&format!(
            "- {author}: {}\n",
            truncate_chars(entry.body.trim(), DISCUSSION_ENTRY_CHARS)
        ));
    }
    out
}
