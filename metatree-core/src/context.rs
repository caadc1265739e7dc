//! The single value threaded through C2–C8 instead of the implicit globals
//! the original tool relied on.

use std::collections::HashMap;

use crate::config::Config;
use crate::diffkey::DiffKey;
use crate::merger::MergeActionTree;

pub type LeafMap = HashMap<DiffKey, String>;

/// Accumulates `(branch, diff-key) -> (occurrence count, last-seen content)`
/// during a single file's parse, per C8.
#[derive(Debug, Clone, Default)]
pub struct DuplicateAccumulator {
    counts: HashMap<(String, DiffKey), (usize, String)>,
}

impl DuplicateAccumulator {
    pub fn record(&mut self, branch: &str, key: DiffKey, content: &str) {
        let entry = self
            .counts
            .entry((branch.to_string(), key))
            .or_insert((0, content.to_string()));
        entry.0 += 1;
        entry.1 = content.to_string();
        if entry.0 > 1 {
            tracing::debug!(branch, count = entry.0, "duplicate diff key encountered during parse");
        }
    }

    /// Rows for the duplicates report: keys seen more than once.
    pub fn duplicates(&self) -> Vec<DuplicateRow> {
        self.counts
            .iter()
            .filter(|(_, (count, _))| *count > 1)
            .map(|((branch, key), (count, content))| DuplicateRow {
                branch: branch.clone(),
                key: key.clone(),
                content: content.clone(),
                count: *count,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateRow {
    pub branch: String,
    pub key: DiffKey,
    pub content: String,
    pub count: usize,
}

/// Threaded through C3/C4/C6 for one file's parse.
pub struct Context<'a> {
    pub config: &'a Config,
    pub branch: String,
    pub file_path: String,
    pub metadata_type: String,
    pub metadata_name: String,
    pub leaves: LeafMap,
    pub duplicates: DuplicateAccumulator,
    /// Bound only during a merge run, for the one target file being spliced.
    pub merge_actions: Option<MergeActionTree>,
    /// Set during a diff run: forces C4 descent into complex sections so
    /// fine-grained `#CONTENTS#`/`#PARAMS#`/child leaves are available for
    /// comparison, per spec §4.3 step 4's "report mode" trigger.
    pub report: bool,
}

impl<'a> Context<'a> {
    pub fn new(config: &'a Config, branch: impl Into<String>, file_path: impl Into<String>) -> Self {
        Context {
            config,
            branch: branch.into(),
            file_path: file_path.into(),
            metadata_type: String::new(),
            metadata_name: String::new(),
            leaves: LeafMap::new(),
            duplicates: DuplicateAccumulator::default(),
            merge_actions: None,
            report: false,
        }
    }

    pub fn scope(&self, path: &[&str]) -> String {
        crate::config::scope_name(&self.metadata_type, path)
    }

    /// Record a leaf map entry, also feeding the duplicate-key detector.
    pub fn emit_leaf(&mut self, key: DiffKey, content: impl Into<String>) {
        let content = content.into();
        self.duplicates.record(&self.branch, key.clone(), &content);
        self.leaves.insert(key, content);
    }
}
