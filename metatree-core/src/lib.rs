//! # metatree-core
//!
//! Parses, diffs, and structurally merges hierarchically nested XML metadata
//! trees describing the configuration of a cloud application repository.
//!
//! The crate is organized around eight components, C1–C8, named for the
//! pipeline stage they implement:
//!
//! - **C1** [`config`] — resolves per-`(type, section-path)` options (sort
//!   rules, delete predicates, filters, reconstruct mode, parser mode) from
//!   a section-oriented configuration file.
//! - **C2** [`keysynth`] — synthesizes a deterministic sort key for a
//!   sub-section's content, falling back to a content-addressed MD5 hash
//!   when no configured tag is present.
//! - **C3** [`parser`] — a line-oriented state machine that tokenizes one
//!   file into a five-level section tree and a flat leaf map.
//! - **C4** [`subparser`] — descends a Standard section's deeper structure
//!   when report mode, a filter, or a bound merge action requires it.
//! - **C5** [`differ`] — compares leaf maps across branches and classifies
//!   every difference into a `Create`/`Update`/`Delete` `File`/`Item` row.
//! - **C6** [`merger`] — builds a merge-action tree from a grouped diff log
//!   and applies it during a target re-parse.
//! - **C7** [`reconstruct`] — serializes a (possibly mutated) tree back to
//!   text, sorting siblings per each section's resolved mode, and performs
//!   the atomic rename-based file swap.
//! - **C8** [`dupes`] — shapes the duplicate-diff-key accumulator (carried
//!   on [`context::Context`]) into report rows.
//!
//! [`context::Context`] is the single value threaded through C2–C8 in place
//! of the implicit globals the tool this crate reimplements relied on: it
//! carries the resolved [`config::Config`], the current branch tag and file
//! path, the shared leaf-map accumulator, the duplicate-key accumulator,
//! and — during a merge run — the bound [`merger::MergeActionTree`].
//!
//! This crate is synchronous, single-threaded, and does no I/O of its own
//! beyond what callers hand it as `&str` text and [`std::path::Path`]
//! targets; directory walking, CSV I/O, interactive prompting, and
//! deployment-package assembly live in the `metatree-cli` binary crate.

pub mod config;
pub mod context;
pub mod differ;
pub mod diffkey;
pub mod dupes;
pub mod error;
pub mod keysynth;
pub mod merger;
pub mod parser;
pub mod reconstruct;
pub mod section;
pub mod subparser;

pub use config::Config;
pub use context::{Context, DuplicateAccumulator, DuplicateRow, LeafMap};
pub use differ::{diff_leaves, DiffRow, MergeAction};
pub use diffkey::{is_fallback_key, DiffKey, LevelKey};
pub use dupes::{report_rows, DuplicateReportRow};
pub use error::{MetatreeError, Result, RowError};
pub use keysynth::md5_hex;
pub use merger::{apply_file_action, build_plans, CreateEntry, FileAction, FileActionKind, MergeActionTree, MergeNode, MergePlan};
pub use parser::parse_file;
pub use reconstruct::{render, write_atomic};
pub use section::{Section, SectionKind, SectionTree, SubSection};

/// A metadata artifact identifier, `TYPE=NAME` in diff-row `Metadata`
/// columns. Used as the grouping key across a source branch and any
/// number of target branches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub metadata_type: String,
    pub name: String,
}

impl FileKey {
    pub fn new(metadata_type: impl Into<String>, name: impl Into<String>) -> Self {
        FileKey {
            metadata_type: metadata_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.metadata_type, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_key_formats_as_type_equals_name() {
        let key = FileKey::new("CustomObject", "Account");
        assert_eq!(key.to_string(), "CustomObject=Account");
    }
}
