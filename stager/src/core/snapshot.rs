//! Relative-path snapshots of a directory tree.
//!
//! Keys are relative paths joined with `/` so manifests read the same on
//! every platform.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    /// Hex SHA-256 of the file contents. Absent for directories and for
    /// scans that skipped hashing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Entry {
    pub fn dir() -> Self {
        Self {
            kind: EntryKind::Dir,
            sha256: None,
        }
    }

    pub fn file(sha256: Option<String>) -> Self {
        Self {
            kind: EntryKind::File,
            sha256,
        }
    }
}

/// Every entry below a root, keyed by relative path, in sorted order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub entries: BTreeMap<String, Entry>,
}

impl Snapshot {
    pub fn insert(&mut self, rel: impl Into<String>, entry: Entry) {
        self.entries.insert(rel.into(), entry);
    }

    pub fn get(&self, rel: &str) -> Option<&Entry> {
        self.entries.get(rel)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.kind == EntryKind::File)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(rel, entry)| (rel.as_str(), entry))
    }
}
