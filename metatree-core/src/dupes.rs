//! C8 — Duplicate-key detector.
//!
//! The accumulation itself lives on `Context` (`DuplicateAccumulator`,
//! updated by every `emit_leaf` call during C3/C4) since it must be
//! threaded alongside the leaf map through the same parse. This module is
//! the report-shaping half: turning accumulated duplicates into rows ready
//! for the duplicate-key CSV.

use crate::context::DuplicateRow;
use crate::diffkey::DEFAULT_SEPARATOR;

/// One row of the duplicate-key report.
#[derive(Debug, Clone)]
pub struct DuplicateReportRow {
    pub branch: String,
    pub diff_key: String,
    pub content: String,
    pub occurrence_count: usize,
}

/// Format accumulated duplicates for a report. Order is insignificant to
/// the data itself; callers sort for presentation as needed.
pub fn report_rows(duplicates: &[DuplicateRow]) -> Vec<DuplicateReportRow> {
    duplicates
        .iter()
        .map(|d| DuplicateReportRow {
            branch: d.branch.clone(),
            diff_key: d.key.to_string_with_sep(DEFAULT_SEPARATOR),
            content: d.content.clone(),
            occurrence_count: d.count,
        })
        .collect()
}
