//! The plan data model: the ordered set of proposed changes for one
//! run, plus its serialized and pull-request-facing forms.

use camino::Utf8Path;
use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest as _, Sha256};

use crate::extract::ImageReference;

/// Hex length of [`Plan::digest`]; branch cleanup uses it to recognize
/// branches this tool created.
pub(crate) const DIGEST_LEN: usize = 16;

/// One proposed change. Only built when the selected tag actually
/// differs from the current one.
#[derive(Debug, Clone)]
pub(crate) struct PlanEntry {
    pub(crate) reference: ImageReference,
    pub(crate) new_tag: String,
    /// The reference's `raw_value` rewritten for `new_tag`; this is the
    /// text that lands in the file.
    pub(crate) new_raw_value: String,
}

/// Proposed changes in scan order: files in path order, references in
/// line order within a file. Empty is the normal "nothing to update"
/// outcome, not an error.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    entries: Vec<PlanEntry>,
}

/// Serialized form of one entry, consumed by CI step outputs.
#[derive(Serialize)]
pub(crate) struct PlanRecord<'plan> {
    pub(crate) file: &'plan Utf8Path,
    pub(crate) field: &'plan str,
    pub(crate) line: usize,
    pub(crate) old: &'plan str,
    pub(crate) new: &'plan str,
}

impl Plan {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: PlanEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub(crate) fn by_file(&self) -> IndexMap<&Utf8Path, Vec<&PlanEntry>> {
        let mut groups: IndexMap<&Utf8Path, Vec<&PlanEntry>> = IndexMap::new();
        for entry in &self.entries {
            groups
                .entry(entry.reference.file.as_path())
                .or_default()
                .push(entry);
        }
        groups
    }

    pub(crate) fn records(&self) -> Vec<PlanRecord<'_>> {
        self.entries
            .iter()
            .map(|entry| PlanRecord {
                file: entry.reference.file.as_path(),
                field: &entry.reference.field,
                line: entry.reference.line,
                old: &entry.reference.raw_value,
                new: &entry.new_raw_value,
            })
            .collect()
    }

    /// Markdown summary grouped by file, used as the pull request body.
    pub(crate) fn description(&self) -> String {
        let mut body = String::new();
        for (file, entries) in self.by_file() {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(&format!("## {file}\n\n"));
            for entry in entries {
                body.push_str(&format!(
                    "* bump {repository} from {old} to {new}\n",
                    repository = entry.reference.repository,
                    old = entry.reference.current_tag,
                    new = entry.new_tag,
                ));
            }
        }
        body
    }

    /// Stable digest over the proposed bumps: identical plans produce
    /// identical branch names across runs, which is what makes re-runs
    /// idempotent at the pull-request level.
    pub(crate) fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            let line = entry.reference.line.to_string();
            for part in [
                entry.reference.file.as_str(),
                line.as_str(),
                entry.reference.repository.as_str(),
                entry.reference.current_tag.as_str(),
                entry.new_tag.as_str(),
            ] {
                hasher.update(part.as_bytes());
                hasher.update([0]);
            }
        }
        hex::encode(&hasher.finalize()[..DIGEST_LEN / 2])
    }
}
