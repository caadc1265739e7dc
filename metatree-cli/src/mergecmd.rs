//! The `merge` subcommand: groups the diff log by `(file, timestamp)` (C6),
//! applies it to the target branch, and reports an `already updated` note
//! for idempotent re-runs. All splicing logic lives in `metatree-core`;
//! this module only owns reading the CSV, resolving paths, and writing the
//! reconstructed files back to disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use metatree_core::{Config, Context, RowError};

use crate::csvio;

pub struct MergeOutcome {
    pub updated_files: Vec<PathBuf>,
    pub already_updated: Vec<PathBuf>,
    pub change_log: BTreeMap<PathBuf, Vec<RowError>>,
}

pub fn run(diff_csv: &Path, target_dir: &Path, source_dir: &Path, config: &Config) -> anyhow::Result<MergeOutcome> {
    let rows = csvio::read_diff_log(diff_csv)?;
    let grouped = csvio::group_by_path(rows);
    let plans = metatree_core::build_plans(&grouped, source_dir);

    let mut updated_files = Vec::new();
    let mut already_updated = Vec::new();
    let mut change_log: BTreeMap<PathBuf, Vec<RowError>> = BTreeMap::new();

    for (relative_path, plan) in plans {
        let target_path = target_dir.join(&relative_path);

        if !plan.errors.is_empty() {
            change_log.insert(relative_path.clone(), plan.errors.clone());
        }

        if let Some(action) = &plan.file_action {
            if plan.already_updated {
                tracing::info!(path = %target_path.display(), "already updated");
                already_updated.push(relative_path.clone());
            }
            match metatree_core::apply_file_action(action, &target_path) {
                Ok(()) => {
                    updated_files.push(relative_path.clone());
                }
                Err(err) => {
                    tracing::error!(path = %target_path.display(), %err, "file-level merge action failed");
                    change_log.entry(relative_path.clone()).or_default().push(RowError {
                        row_index: usize::MAX,
                        message: err.to_string(),
                    });
                    continue;
                }
            }
        }

        if !plan.tree.has_pending() {
            continue;
        }

        let text = match std::fs::read_to_string(&target_path) {
            Ok(t) => t,
            Err(err) => {
                tracing::error!(path = %target_path.display(), %err, "target file missing for structural merge");
                change_log.entry(relative_path.clone()).or_default().push(RowError {
                    row_index: usize::MAX,
                    message: format!("target file missing: {err}"),
                });
                continue;
            }
        };

        let mut ctx = Context::new(config, "MERGE", target_path.to_string_lossy().into_owned());
        ctx.merge_actions = Some(plan.tree);

        let tree = match metatree_core::parse_file(&mut ctx, &text) {
            Ok(t) => t,
            Err(err) => {
                tracing::error!(path = %target_path.display(), %err, "failed to parse target for structural merge");
                change_log.entry(relative_path.clone()).or_default().push(RowError {
                    row_index: usize::MAX,
                    message: err.to_string(),
                });
                continue;
            }
        };

        let rendered = metatree_core::render(&tree);
        metatree_core::write_atomic(&target_path, &rendered)?;
        if !updated_files.contains(&relative_path) {
            updated_files.push(relative_path.clone());
        }
    }

    Ok(MergeOutcome {
        updated_files,
        already_updated,
        change_log,
    })
}
