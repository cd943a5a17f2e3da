use std::sync::LazyLock;

use regex::Regex;

static REFERENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:#|pull/)(\d+)").ok());

/// Collects change-set numbers referenced as `#123` or `pull/123`.
///
/// The result is deduplicated and sorted ascending.
pub fn extract_change_set_ids(text: &str) -> Vec<u64> {
    let Some(reference) = REFERENCE.as_ref() else {
        return Vec::new();
    };
    let mut ids: Vec<u64> = reference
        .captures_iter(text)
        .filter_map(|captures| captures.get(1)?.as_str().parse::<u64>().ok())
        .filter(|id| *id > 0)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
