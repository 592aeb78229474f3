//! Selection of generated entries: what the flow produced relative to the
//! input snapshot taken at prepare time.

use serde::{Deserialize, Serialize};

use crate::core::snapshot::{Entry, EntryKind, Snapshot};

/// Policy deciding which workspace entries count as generated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffRule {
    /// Only paths absent from the input snapshot.
    #[default]
    Path,
    /// Absent paths, plus files whose contents or kind changed.
    Content,
}

impl DiffRule {
    /// Whether workspace scans must hash file contents for this rule.
    pub fn needs_hashes(self) -> bool {
        matches!(self, DiffRule::Content)
    }
}

/// Entries of `current` that are generated relative to `baseline`, in path order.
pub fn generated_entries<'a>(
    baseline: &Snapshot,
    current: &'a Snapshot,
    rule: DiffRule,
) -> Vec<(&'a str, &'a Entry)> {
    current
        .iter()
        .filter(|(rel, entry)| match baseline.get(rel) {
            None => true,
            Some(base) => match rule {
                DiffRule::Path => false,
                DiffRule::Content => changed(base, entry),
            },
        })
        .collect()
}

fn changed(base: &Entry, current: &Entry) -> bool {
    if base.kind != current.kind {
        return true;
    }
    match current.kind {
        EntryKind::Dir => false,
        // A missing digest on either side cannot prove the file unchanged.
        EntryKind::File => match (&base.sha256, &current.sha256) {
            (Some(left), Some(right)) => left != right,
            _ => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(hash: &str) -> Entry {
        Entry::file(Some(hash.to_string()))
    }

    fn baseline() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.insert("a.txt", file("aaa"));
        snapshot.insert("docs", Entry::dir());
        snapshot.insert("docs/spec.pdf", file("ppp"));
        snapshot
    }

    fn paths(selected: &[(&str, &Entry)]) -> Vec<String> {
        selected.iter().map(|(rel, _)| rel.to_string()).collect()
    }

    #[test]
    fn path_rule_ignores_edited_inputs() {
        let mut current = baseline();
        current.insert("a.txt", file("edited"));
        current.insert("b.txt", file("bbb"));

        let selected = generated_entries(&baseline(), &current, DiffRule::Path);
        assert_eq!(paths(&selected), vec!["b.txt"]);
    }

    #[test]
    fn content_rule_includes_edited_inputs() {
        let mut current = baseline();
        current.insert("a.txt", file("edited"));
        current.insert("b.txt", file("bbb"));

        let selected = generated_entries(&baseline(), &current, DiffRule::Content);
        assert_eq!(paths(&selected), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn new_directories_are_generated_even_when_empty() {
        let mut current = baseline();
        current.insert("charts", Entry::dir());

        let selected = generated_entries(&baseline(), &current, DiffRule::Path);
        assert_eq!(paths(&selected), vec!["charts"]);
    }

    #[test]
    fn content_rule_detects_kind_change_and_missing_digest() {
        let mut current = baseline();
        current.insert("a.txt", Entry::dir());
        current.insert("docs/spec.pdf", Entry::file(None));

        let selected = generated_entries(&baseline(), &current, DiffRule::Content);
        assert_eq!(paths(&selected), vec!["a.txt", "docs/spec.pdf"]);
    }

    #[test]
    fn unchanged_workspace_generates_nothing() {
        let current = baseline();
        assert!(generated_entries(&baseline(), &current, DiffRule::Content).is_empty());
        assert!(generated_entries(&baseline(), &current, DiffRule::Path).is_empty());
    }

    #[test]
    fn deleted_inputs_are_not_reported() {
        let mut current = Snapshot::default();
        current.insert("b.txt", file("bbb"));
        let selected = generated_entries(&baseline(), &current, DiffRule::Content);
        assert_eq!(paths(&selected), vec!["b.txt"]);
    }
}
