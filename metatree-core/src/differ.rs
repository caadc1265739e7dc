//! C5 — Differ.
//!
//! Input: for each `(type, name)` a set of leaf maps tagged by branch
//! (`SRC`, `TRG1`, `TRG2`, …). Output: one diff row per differing leaf,
//! classified top-down by level.

use crate::context::LeafMap;
use crate::diffkey::{DiffKey, LevelKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    CreateFile,
    UpdateFile,
    DeleteFile,
    CreateItem,
    UpdateItem,
    DeleteItem,
}

impl MergeAction {
    /// The literal string used in the CSV `Merge Action` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeAction::CreateFile => "Create File",
            MergeAction::UpdateFile => "Update File",
            MergeAction::DeleteFile => "Delete File",
            MergeAction::CreateItem => "Create Item",
            MergeAction::UpdateItem => "Update Item",
            MergeAction::DeleteItem => "Delete Item",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Create File" => Some(MergeAction::CreateFile),
            "Update File" => Some(MergeAction::UpdateFile),
            "Delete File" => Some(MergeAction::DeleteFile),
            "Create Item" => Some(MergeAction::CreateItem),
            "Update Item" => Some(MergeAction::UpdateItem),
            "Delete Item" => Some(MergeAction::DeleteItem),
            _ => None,
        }
    }
}

/// One row of the diff log — the CSV schema, with the
/// catch-all trailing `Old Value` columns (one per extra target branch)
/// kept separate from the primary `TRG1` old value.
#[derive(Debug, Clone)]
pub struct DiffRow {
    pub dev_work_log_name: String,
    pub request_timestamp: String,
    pub work_team: String,
    pub developer_name: String,
    pub user_story: String,
    pub merge_action: MergeAction,
    pub metadata: String,
    pub path: String,
    pub l1_key: String,
    pub l2_key: String,
    pub l3_key: String,
    pub l4_key: String,
    pub new_value: String,
    pub old_values: Vec<String>,
}

/// Strip leading whitespace on every line; the comparison two leaves use to
/// decide equality, so reindentation alone never diffs.
fn normalize(content: &str) -> String {
    content.lines().map(|l| l.trim_start()).collect::<Vec<_>>().join("\n")
}

struct PendingSkip {
    skip_metadata: bool,
    skip_parent: Option<String>,
}

/// Diff one target branch's leaf map against the source leaf map for a
/// single artifact, producing classified rows in key order.
///
/// `old_maps` holds the `TRG1` map first (whose content feeds the `Old
/// Value` column) followed by any further target branches, which only ever
/// contribute additional trailing `Old Value` columns and never change the
/// classification.
pub fn diff_leaves(path: &str, src: &LeafMap, old_maps: &[&LeafMap]) -> Vec<DiffRow> {
    let mut rows = Vec::new();
    let mut keys: Vec<&DiffKey> = src.keys().collect();
    keys.sort_by_key(|k| k.to_string_with_sep(crate::diffkey::DEFAULT_SEPARATOR));

    let primary = old_maps.first().copied();
    let mut skip = PendingSkip {
        skip_metadata: false,
        skip_parent: None,
    };

    for key in keys {
        if skip.skip_metadata {
            break;
        }
        let new_content = &src[key];
        let trg_content = primary.and_then(|m| m.get(key));

        if let Some(parent) = &skip.skip_parent {
            if let Some(parent_level) = key.depth().and_then(|d| if d > 0 { Some(d - 1) } else { None }) {
                if &key.levels[parent_level].token() == parent {
                    continue;
                }
            }
            skip.skip_parent = None;
        }

        if let Some(row) = classify(path, key, new_content, trg_content, &mut skip) {
            let mut row = row;
            let extra_old_values: Vec<String> = old_maps
                .get(1..)
                .unwrap_or(&[])
                .iter()
                .map(|m| m.get(key).cloned().unwrap_or_default())
                .collect();
            if !extra_old_values.is_empty() {
                row.old_values.extend(extra_old_values);
            }
            rows.push(row);
        }
    }

    rows
}

fn classify(
    path: &str,
    key: &DiffKey,
    new_content: &str,
    trg_content: Option<&String>,
    skip: &mut PendingSkip,
) -> Option<DiffRow> {
    let l1 = key.l1();

    if matches!(l1, LevelKey::NewMetadata) {
        if trg_content.is_none() {
            skip.skip_metadata = true;
            return Some(base_row(path, key, MergeAction::CreateFile, new_content));
        }
        return None;
    }

    if matches!(l1, LevelKey::Overwrite) {
        let action = if trg_content.is_none() {
            MergeAction::CreateFile
        } else if normalize(new_content) == trg_content.map(|s| normalize(s)).unwrap_or_default() {
            return None;
        } else {
            MergeAction::UpdateFile
        };
        return Some(base_row(path, key, action, new_content));
    }

    match trg_content {
        None => {
            let depth = key.depth().unwrap_or(0);
            if key.levels[depth] == LevelKey::Contents {
                if depth > 0 {
                    skip.skip_parent = Some(key.levels[depth - 1].token());
                }
            }
            Some(base_row(path, key, MergeAction::CreateItem, new_content))
        }
        Some(old) => {
            if key.contains(&LevelKey::Contents) {
                return None;
            }
            if normalize(new_content) == normalize(old) {
                return None;
            }
            let mut row = base_row(path, key, MergeAction::UpdateItem, new_content);
            row.old_values = vec![old.clone()];
            Some(row)
        }
    }
}

fn base_row(path: &str, key: &DiffKey, action: MergeAction, new_content: &str) -> DiffRow {
    DiffRow {
        dev_work_log_name: String::new(),
        request_timestamp: String::new(),
        work_team: String::new(),
        developer_name: String::new(),
        user_story: String::new(),
        merge_action: action,
        metadata: String::new(),
        path: path.to_string(),
        l1_key: key.levels[0].token(),
        l2_key: key.levels[1].token(),
        l3_key: key.levels[2].token(),
        l4_key: key.levels[3].token(),
        new_value: new_content.to_string(),
        old_values: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(content: &str) -> String {
        content.to_string()
    }

    #[test]
    fn equal_leaves_after_whitespace_normalization_produce_no_row() {
        let mut src = LeafMap::new();
        let key = DiffKey::new("a.object").with_level(0, LevelKey::structural("version", "#PARAM#"));
        src.insert(key.clone(), leaf("  <version>1.0</version>\n"));
        let mut trg = LeafMap::new();
        trg.insert(key, leaf("<version>1.0</version>\n"));

        let rows = diff_leaves("a.object", &src, &[&trg]);
        assert!(rows.is_empty());
    }

    #[test]
    fn new_structural_leaf_becomes_create_item() {
        let mut src = LeafMap::new();
        let key = DiffKey::new("a.object").with_level(0, LevelKey::structural("fields", "Foo__c"));
        src.insert(key.clone(), leaf("<fields>...</fields>\n"));
        let trg = LeafMap::new();

        let rows = diff_leaves("a.object", &src, &[&trg]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].merge_action, MergeAction::CreateItem);
        assert_eq!(rows[0].l1_key, "fields=Foo__c");
    }

    #[test]
    fn contents_leaf_with_existing_parent_is_treated_as_equal() {
        let mut src = LeafMap::new();
        let key = DiffKey::new("a.object")
            .with_level(0, LevelKey::structural("fields", "Foo__c"))
            .with_level(1, LevelKey::Contents);
        src.insert(key.clone(), leaf("<fields>...</fields>\n"));
        let mut trg = LeafMap::new();
        trg.insert(key, leaf("<fields>old</fields>\n"));

        let rows = diff_leaves("a.object", &src, &[&trg]);
        assert!(rows.is_empty());
    }

    #[test]
    fn changed_param_becomes_update_item_with_old_value() {
        let mut src = LeafMap::new();
        let key = DiffKey::new("a.object").with_level(0, LevelKey::structural("version", "#PARAM#"));
        src.insert(key.clone(), leaf("<version>2.0</version>\n"));
        let mut trg = LeafMap::new();
        trg.insert(key, leaf("<version>1.0</version>\n"));

        let rows = diff_leaves("a.object", &src, &[&trg]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].merge_action, MergeAction::UpdateItem);
        assert_eq!(rows[0].old_values, vec!["<version>1.0</version>\n".to_string()]);
    }

    #[test]
    fn merge_action_round_trips_through_csv_literal() {
        for action in [
            MergeAction::CreateFile,
            MergeAction::UpdateFile,
            MergeAction::DeleteFile,
            MergeAction::CreateItem,
            MergeAction::UpdateItem,
            MergeAction::DeleteItem,
        ] {
            assert_eq!(MergeAction::from_str(action.as_str()), Some(action));
        }
    }
}
