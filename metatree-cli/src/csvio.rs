//! CSV diff-log reader/writer.
//!
//! The diff file format is UTF-8, always-quoted CSV with a
//! fixed header plus a variable number of trailing `Old Value` columns (one
//! per extra target branch). Column names also accept their alternative
//! `Snake_Case__c` spelling. This module reads and writes that exact
//! format; it carries no algorithmic content of its own — the diffing and
//! merging logic lives entirely in `metatree-core`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use metatree_core::{DiffRow, MergeAction};

/// One header column and its accepted spellings.
struct Column {
    canonical: &'static str,
    alt: &'static str,
}

const REQUIRED_COLUMNS: &[Column] = &[
    Column { canonical: "Developer Work Log Name", alt: "Developer_Work_Log_Name__c" },
    Column { canonical: "Request Time Stamp", alt: "Request_Time_Stamp__c" },
    Column { canonical: "Work Team", alt: "Work_Team__c" },
    Column { canonical: "Developer Name", alt: "Developer_Name__c" },
    Column { canonical: "User Story", alt: "User_Story__c" },
    Column { canonical: "Merge Action", alt: "Merge_Action__c" },
    Column { canonical: "Metadata", alt: "Metadata__c" },
    Column { canonical: "Path", alt: "Path__c" },
    Column { canonical: "L1 Key", alt: "L1_Key__c" },
    Column { canonical: "L2 Key", alt: "L2_Key__c" },
    Column { canonical: "L3 Key", alt: "L3_Key__c" },
    Column { canonical: "L4 Key", alt: "L4_Key__c" },
    Column { canonical: "New Value", alt: "New_Value__c" },
];

const OLD_VALUE: Column = Column { canonical: "Old Value", alt: "Old_Value__c" };

/// Find the index of the first header matching `col`'s canonical or
/// alternative spelling. Trailing `Old Value` columns past the first are
/// matched loosely by prefix since duplicate header names are otherwise
/// ambiguous in a `StringRecord`.
fn find_column(headers: &StringRecord, col: &Column) -> Option<usize> {
    headers.iter().position(|h| h == col.canonical || h == col.alt)
}

fn all_old_value_indices(headers: &StringRecord) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, h)| *h == OLD_VALUE.canonical || *h == OLD_VALUE.alt)
        .map(|(i, _)| i)
        .collect()
}

pub fn read_diff_log(path: &Path) -> anyhow::Result<Vec<DiffRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening diff log {}", path.display()))?;

    let headers = reader.headers()?.clone();

    let mut indices = HashMap::new();
    let mut missing = Vec::new();
    for col in REQUIRED_COLUMNS {
        match find_column(&headers, col) {
            Some(idx) => {
                indices.insert(col.canonical, idx);
            }
            None => missing.push(col.canonical),
        }
    }
    if !missing.is_empty() {
        bail!(
            "{}: diff log missing required column(s): {}",
            path.display(),
            missing.join(", ")
        );
    }
    let old_value_indices = all_old_value_indices(&headers);
    if old_value_indices.is_empty() {
        bail!("{}: diff log missing required column(s): Old Value", path.display());
    }

    let get = |record: &StringRecord, name: &str| -> String {
        indices
            .get(name)
            .and_then(|&i| record.get(i))
            .unwrap_or_default()
            .to_string()
    };

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("reading row from {}", path.display()))?;
        let action_str = get(&record, "Merge Action");
        let Some(merge_action) = MergeAction::from_str(&action_str) else {
            tracing::error!(action = %action_str, "unknown merge action in diff log row");
            continue;
        };
        let old_values = old_value_indices
            .iter()
            .map(|&i| record.get(i).unwrap_or_default().to_string())
            .collect();

        rows.push(DiffRow {
            dev_work_log_name: get(&record, "Developer Work Log Name"),
            request_timestamp: get(&record, "Request Time Stamp"),
            work_team: get(&record, "Work Team"),
            developer_name: get(&record, "Developer Name"),
            user_story: get(&record, "User Story"),
            merge_action,
            metadata: get(&record, "Metadata"),
            path: get(&record, "Path"),
            l1_key: get(&record, "L1 Key"),
            l2_key: get(&record, "L2 Key"),
            l3_key: get(&record, "L3 Key"),
            l4_key: get(&record, "L4 Key"),
            new_value: get(&record, "New Value"),
            old_values,
        });
    }

    Ok(rows)
}

/// Write a diff log, padding every row's trailing `Old Value` columns out
/// to the widest row so the CSV stays rectangular.
pub fn write_diff_log(path: &Path, rows: &[DiffRow]) -> anyhow::Result<()> {
    let max_old_values = rows.iter().map(|r| r.old_values.len()).max().unwrap_or(1).max(1);

    let mut writer = WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_path(path)
        .with_context(|| format!("creating diff log {}", path.display()))?;

    let mut header: Vec<&str> = REQUIRED_COLUMNS.iter().map(|c| c.canonical).collect();
    let old_value_headers: Vec<String> = (0..max_old_values)
        .map(|_| OLD_VALUE.canonical.to_string())
        .collect();
    header.extend(old_value_headers.iter().map(|s| s.as_str()));
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.dev_work_log_name.clone(),
            row.request_timestamp.clone(),
            row.work_team.clone(),
            row.developer_name.clone(),
            row.user_story.clone(),
            row.merge_action.as_str().to_string(),
            row.metadata.clone(),
            row.path.clone(),
            row.l1_key.clone(),
            row.l2_key.clone(),
            row.l3_key.clone(),
            row.l4_key.clone(),
            row.new_value.clone(),
        ];
        for i in 0..max_old_values {
            record.push(row.old_values.get(i).cloned().unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the duplicate-key report: `MetadataKey, Content, Count`, with
/// `MetadataKey` rendered as newline-joined path levels for readability
/// when opened outside this tool.
pub fn write_duplicates_csv(path: &Path, rows: &[metatree_core::DuplicateReportRow]) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_path(path)
        .with_context(|| format!("creating duplicates report {}", path.display()))?;

    writer.write_record(["MetadataKey", "Content", "Count"])?;
    for row in rows {
        let readable_key = row.diff_key.replace('\u{1E}', "\n");
        writer.write_record(&[readable_key, row.content.clone(), row.occurrence_count.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Group diff rows by target path. Each group's rows retain their original
/// order; `metatree_core::build_plans` sorts them by timestamp ascending.
pub fn group_by_path(rows: Vec<DiffRow>) -> HashMap<PathBuf, Vec<(String, DiffRow)>> {
    let mut grouped: HashMap<PathBuf, Vec<(String, DiffRow)>> = HashMap::new();
    for row in rows {
        let path = PathBuf::from(&row.path);
        let timestamp = row.request_timestamp.clone();
        grouped.entry(path).or_default().push((timestamp, row));
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_what_it_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diff.csv");

        let row = DiffRow {
            dev_work_log_name: "wl1".to_string(),
            request_timestamp: "2026-01-01T00:00:00".to_string(),
            work_team: "TeamA".to_string(),
            developer_name: "Dev".to_string(),
            user_story: "US-1".to_string(),
            merge_action: MergeAction::UpdateItem,
            metadata: "CustomObject=Account".to_string(),
            path: "objects/Account/Account.object".to_string(),
            l1_key: "fields=Foo__c".to_string(),
            l2_key: "#CONTENTS#".to_string(),
            l3_key: String::new(),
            l4_key: String::new(),
            new_value: "<fields>...</fields>\n".to_string(),
            old_values: vec!["<fields>old</fields>\n".to_string()],
        };

        write_diff_log(&path, &[row]).unwrap();
        let rows = read_diff_log(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].merge_action, MergeAction::UpdateItem);
        assert_eq!(rows[0].l1_key, "fields=Foo__c");
        assert_eq!(rows[0].old_values[0], "<fields>old</fields>\n");
    }

    #[test]
    fn accepts_snake_case_header_variant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diff.csv");
        std::fs::write(
            &path,
            "\"Developer_Work_Log_Name__c\",\"Request_Time_Stamp__c\",\"Work_Team__c\",\"Developer_Name__c\",\"User_Story__c\",\"Merge_Action__c\",\"Metadata__c\",\"Path__c\",\"L1_Key__c\",\"L2_Key__c\",\"L3_Key__c\",\"L4_Key__c\",\"New_Value__c\",\"Old_Value__c\"\n\"wl\",\"ts\",\"team\",\"dev\",\"story\",\"Create File\",\"StaticResource=Logo\",\"staticresources/Logo.resource\",\"\",\"\",\"\",\"\",\"bytes\",\"\"\n",
        )
        .unwrap();

        let rows = read_diff_log(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].merge_action, MergeAction::CreateFile);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diff.csv");
        std::fs::write(&path, "\"Merge Action\"\n\"Create File\"\n").unwrap();

        let err = read_diff_log(&path).unwrap_err();
        assert!(err.to_string().contains("missing required column"));
    }
}
