//! C6 — Merger.
//!
//! Input: a grouped diff log organized as `path → timestamp → [rows]`. Rows
//! are sorted within a path by timestamp ascending (textual compare) so
//! older pull requests apply first.
//!
//! The merge-action tree is a tagged tree: each node has an
//! optional `##CHANGE##` payload, an optional `##DELETE##` marker, and named
//! per-section `##CREATE##` lists. The engine consumes entries as it
//! descends; consumed entries become empty (via `Option::take`/`Vec::drain`)
//! to make double-application structurally impossible.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::differ::{DiffRow, MergeAction};
use crate::diffkey::LevelKey;
use crate::error::{MetatreeError, RowError};

#[derive(Debug, Clone)]
pub struct CreateEntry {
    pub sort_key: String,
    pub content: String,
}

/// One node of the merge-action tree, rooted at a target file.
#[derive(Debug, Clone, Default)]
pub struct MergeNode {
    change: Option<String>,
    delete: bool,
    /// Pending new entries, grouped by the section (tag) they belong to.
    creates: HashMap<String, Vec<CreateEntry>>,
    children: HashMap<String, MergeNode>,
}

pub type MergeActionTree = MergeNode;

impl MergeNode {
    /// Navigate to (creating as needed) the child identified by this level
    /// token — used only while building the tree from diff rows.
    fn child_mut(&mut self, token: &str) -> &mut MergeNode {
        self.children.entry(token.to_string()).or_default()
    }

    /// Look up an existing child without creating one — used while parsing,
    /// to check whether an action is bound for the entry just read.
    pub fn child(&self, token: &str) -> Option<&MergeNode> {
        self.children.get(token)
    }

    pub fn child_owned(&mut self, token: &str) -> Option<MergeNode> {
        self.children.remove(token)
    }

    /// Consume the `##CHANGE##` payload bound at this node, if any.
    pub fn take_change(&mut self) -> Option<String> {
        self.change.take()
    }

    /// Consume the `##DELETE##` marker bound at this node, if any.
    pub fn take_delete(&mut self) -> bool {
        std::mem::take(&mut self.delete)
    }

    /// Pending creates for the named section at this node, in insertion
    /// order — callers pop/drain as they splice each into sorted position.
    pub fn creates_for(&mut self, section_name: &str) -> Vec<CreateEntry> {
        self.creates.remove(section_name).unwrap_or_default()
    }

    /// Every section name with at least one pending create at this node —
    /// used to flush brand-new sections that never appeared in the target.
    pub fn pending_sections(&self) -> Vec<String> {
        self.creates.keys().cloned().collect()
    }

    #[cfg(test)]
    pub fn set_change_for_test(&mut self, content: impl Into<String>) {
        self.change = Some(content.into());
    }

    #[cfg(test)]
    pub fn push_create_for_test(&mut self, section_name: &str, sort_key: &str, content: &str) {
        self.creates.entry(section_name.to_string()).or_default().push(CreateEntry {
            sort_key: sort_key.to_string(),
            content: content.to_string(),
        });
    }

    pub fn has_pending(&self) -> bool {
        self.change.is_some()
            || self.delete
            || !self.creates.is_empty()
            || !self.children.is_empty()
    }
}

/// A file-level action (`Create File` / `Update File` / `Delete File`),
/// applied by whole-file copy/unlink rather than structural splicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileActionKind {
    CreateOrUpdate,
    Delete,
}

#[derive(Debug, Clone)]
pub struct FileAction {
    pub kind: FileActionKind,
    pub source: Option<PathBuf>,
}

/// The fully built plan for one target file: either a whole-file action, or
/// a structural action tree to bind during a re-parse.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub file_action: Option<FileAction>,
    pub tree: MergeActionTree,
    pub errors: Vec<RowError>,
    pub already_updated: bool,
}

/// Build merge plans for every target path named in the diff log.
///
/// `rows_by_path` must already be grouped by target path with rows sorted
/// by request timestamp ascending (textual compare).
/// `source_root` resolves `Create File`/`Update File` rows to the source
/// artifact to copy — the diff log itself carries no file contents, only
/// the relative path the row was raised against.
pub fn build_plans(
    rows_by_path: &HashMap<PathBuf, Vec<(String, DiffRow)>>,
    source_root: &Path,
) -> HashMap<PathBuf, MergePlan> {
    let mut plans = HashMap::new();

    for (path, rows) in rows_by_path {
        let mut sorted = rows.clone();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut plan = MergePlan::default();
        let mut file_action_applied = false;

        for (row_index, (_timestamp, row)) in sorted.iter().enumerate() {
            match row.merge_action {
                MergeAction::CreateFile | MergeAction::UpdateFile => {
                    if file_action_applied {
                        plan.already_updated = true;
                        continue;
                    }
                    plan.file_action = Some(FileAction {
                        kind: FileActionKind::CreateOrUpdate,
                        source: Some(source_root.join(&row.path)),
                    });
                    file_action_applied = true;
                }
                MergeAction::DeleteFile => {
                    plan.file_action = Some(FileAction {
                        kind: FileActionKind::Delete,
                        source: None,
                    });
                }
                MergeAction::CreateItem => {
                    insert_create(&mut plan.tree, row, row_index, &mut plan.errors);
                }
                MergeAction::UpdateItem => {
                    insert_change(&mut plan.tree, row, row_index, &mut plan.errors);
                }
                MergeAction::DeleteItem => {
                    insert_delete(&mut plan.tree, row, row_index, &mut plan.errors);
                }
            }
        }

        plans.insert(path.clone(), plan);
    }

    plans
}

fn path_tokens(row: &DiffRow) -> Vec<String> {
    [&row.l1_key, &row.l2_key, &row.l3_key, &row.l4_key]
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn push_row_error(errors: &mut Vec<RowError>, row_index: usize, message: impl Into<String>) {
    let message = message.into();
    tracing::error!(row_index, %message, "merge row error");
    errors.push(RowError { row_index, message });
}

fn insert_create(tree: &mut MergeNode, row: &DiffRow, row_index: usize, errors: &mut Vec<RowError>) {
    let tokens = path_tokens(row);
    let Some((last, parent_tokens)) = tokens.split_last() else {
        push_row_error(errors, row_index, "Create Item with no path");
        return;
    };
    let LevelKey::Structural { section, value } = LevelKey::parse(last) else {
        push_row_error(errors, row_index, format!("Create Item target {last} is not a named entry"));
        return;
    };

    let mut node = tree;
    for token in parent_tokens {
        node = node.child_mut(token);
    }
    node.creates.entry(section).or_default().push(CreateEntry {
        sort_key: value,
        content: row.new_value.clone(),
    });
}

fn insert_change(tree: &mut MergeNode, row: &DiffRow, row_index: usize, errors: &mut Vec<RowError>) {
    let tokens = path_tokens(row);
    if tokens.is_empty() {
        push_row_error(errors, row_index, "Update Item with no path");
        return;
    }
    let mut node = tree;
    for token in &tokens {
        node = node.child_mut(token);
    }
    node.change = Some(row.new_value.clone());
}

fn insert_delete(tree: &mut MergeNode, row: &DiffRow, row_index: usize, errors: &mut Vec<RowError>) {
    let tokens = path_tokens(row);
    if tokens.is_empty() {
        push_row_error(errors, row_index, "Delete Item with no path");
        return;
    }
    let mut node = tree;
    for token in &tokens {
        node = node.child_mut(token);
    }
    node.delete = true;
}

/// Apply a file-level action (copy or unlink). Structural actions are
/// applied by the caller via `parser::parse_with_merge` + `reconstruct`.
pub fn apply_file_action(action: &FileAction, target: &Path) -> Result<(), MetatreeError> {
    match action.kind {
        FileActionKind::CreateOrUpdate => {
            let source = action.source.as_ref().expect("create/update carries a source");
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| MetatreeError::Io {
                    path: target.to_path_buf(),
                    source: e,
                })?;
            }
            fs::copy(source, target).map_err(|e| MetatreeError::Io {
                path: target.to_path_buf(),
                source: e,
            })?;
            Ok(())
        }
        FileActionKind::Delete => {
            if target.exists() {
                fs::remove_file(target).map_err(|e| MetatreeError::Io {
                    path: target.to_path_buf(),
                    source: e,
                })?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::MergeAction;

    fn row(action: MergeAction, l1: &str, l2: &str, new_value: &str) -> DiffRow {
        DiffRow {
            dev_work_log_name: String::new(),
            request_timestamp: "2026-01-01T00:00:00".to_string(),
            work_team: String::new(),
            developer_name: String::new(),
            user_story: String::new(),
            merge_action: action,
            metadata: "CustomObject=Account".to_string(),
            path: "objects/Account/Account.object".to_string(),
            l1_key: l1.to_string(),
            l2_key: l2.to_string(),
            l3_key: String::new(),
            l4_key: String::new(),
            new_value: new_value.to_string(),
            old_values: vec![],
        }
    }

    #[test]
    fn create_item_lands_in_parent_creates_list() {
        let mut tree = MergeNode::default();
        let mut errors = Vec::new();
        let r = row(MergeAction::CreateItem, "fields=Foo__c", "", "<fields>...</fields>\n");
        insert_create(&mut tree, &r, 0, &mut errors);
        assert!(errors.is_empty());
        let creates = tree.creates_for("fields");
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].sort_key, "Foo__c");
    }

    #[test]
    fn update_item_sets_change_at_full_path() {
        let mut tree = MergeNode::default();
        let mut errors = Vec::new();
        let r = row(MergeAction::UpdateItem, "fields=Foo__c", "#CONTENTS#", "<fields>new</fields>\n");
        insert_change(&mut tree, &r, 0, &mut errors);
        let child = tree.child_mut("fields=Foo__c").child_mut("#CONTENTS#");
        assert_eq!(child.take_change(), Some("<fields>new</fields>\n".to_string()));
    }

    #[test]
    fn delete_item_sets_delete_flag() {
        let mut tree = MergeNode::default();
        let mut errors = Vec::new();
        let r = row(MergeAction::DeleteItem, "indexes=#SINGLE#", "", "");
        insert_delete(&mut tree, &r, 0, &mut errors);
        let child = tree.child_mut("indexes=#SINGLE#");
        assert!(child.take_delete());
    }

    #[test]
    fn consumed_entries_cannot_double_apply() {
        let mut node = MergeNode::default();
        node.change = Some("x".to_string());
        assert_eq!(node.take_change(), Some("x".to_string()));
        assert_eq!(node.take_change(), None);
    }
}
