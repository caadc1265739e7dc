//! The `diff` subcommand: walks `source` and each `target`, parses matching
//! artifacts (C3), diffs them (C5), and writes a diff CSV plus, if any were
//! recorded, a duplicate-key CSV. This module is pure orchestration; all
//! algorithmic content is in `metatree-core`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use metatree_core::{diff_leaves, report_rows, Config, Context, DiffKey, DiffRow, FileKey, LevelKey};

use crate::csvio;
use crate::walk::{self, DirKind};

/// A parsed (or overwrite-synthesized) leaf map for one artifact, tagged
/// with the relative path it came from.
struct ParsedFile {
    key: FileKey,
    path: String,
    leaves: metatree_core::LeafMap,
}

/// Parse every discovered file in a branch directory into `(FileKey ->
/// LeafMap)`, tracking any duplicate-key rows encountered along the way.
fn parse_branch(
    root: &Path,
    config: &Config,
    branch: &str,
    duplicates_out: &mut Vec<metatree_core::DuplicateRow>,
) -> HashMap<FileKey, ParsedFile> {
    let mut out = HashMap::new();

    for file in walk::walk_repo(root, config) {
        let display_path = file.relative_path.to_string_lossy().replace('\\', "/");

        match file.kind {
            DirKind::Merge => {
                let Ok(text) = std::fs::read_to_string(&file.full_path) else {
                    tracing::warn!(path = %file.full_path.display(), "skipping unreadable file");
                    continue;
                };
                let mut ctx = Context::new(config, branch, display_path.clone());
                ctx.report = true;
                match metatree_core::parse_file(&mut ctx, &text) {
                    Ok(_tree) => {
                        let key = FileKey::new(ctx.metadata_type.clone(), ctx.metadata_name.clone());
                        duplicates_out.extend(ctx.duplicates.duplicates());
                        out.insert(
                            key.clone(),
                            ParsedFile {
                                key,
                                path: display_path,
                                leaves: ctx.leaves,
                            },
                        );
                    }
                    Err(err) => {
                        tracing::info!(path = %file.full_path.display(), %err, "skipping non-metadata file");
                    }
                }
            }
            DirKind::Overwrite => {
                let Ok(bytes) = std::fs::read(&file.full_path) else {
                    tracing::warn!(path = %file.full_path.display(), "skipping unreadable file");
                    continue;
                };
                let (metadata_type, name) = walk::infer_overwrite_type_name(config, &file.top_level_dir, &bare_name(&file.relative_path))
                    .unwrap_or_else(|| (file.top_level_dir.clone(), bare_name(&file.relative_path)));
                let key = FileKey::new(metadata_type, name);
                let mut leaves = metatree_core::LeafMap::new();
                let diff_key = DiffKey::new(display_path.clone()).with_level(0, LevelKey::Overwrite);
                leaves.insert(diff_key, metatree_core::md5_hex(&bytes));
                out.insert(
                    key.clone(),
                    ParsedFile {
                        key,
                        path: display_path,
                        leaves,
                    },
                );
            }
        }
    }

    out
}

fn bare_name(relative_path: &Path) -> String {
    relative_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct DiffOutcome {
    pub rows: Vec<DiffRow>,
    pub duplicates: Vec<metatree_core::DuplicateReportRow>,
}

/// Compare `source` against every directory in `targets`, producing one
/// diff row per differing leaf across all targets combined. `targets[0]` is
/// `TRG1` (whose content feeds the primary `Old Value` column); any further
/// targets only ever contribute trailing `Old Value` columns.
pub fn run(source: &Path, targets: &[PathBuf], config: &Config) -> anyhow::Result<DiffOutcome> {
    let mut duplicates = Vec::new();
    let src_files = parse_branch(source, config, "SRC", &mut duplicates);

    let target_branches: Vec<HashMap<FileKey, ParsedFile>> = targets
        .iter()
        .enumerate()
        .map(|(i, dir)| parse_branch(dir, config, &format!("TRG{}", i + 1), &mut duplicates))
        .collect();

    let mut rows = Vec::new();
    let empty_leaves = metatree_core::LeafMap::new();

    let mut src_keys: Vec<&FileKey> = src_files.keys().collect();
    src_keys.sort();

    for file_key in src_keys {
        let parsed = &src_files[file_key];

        let old_maps: Vec<&metatree_core::LeafMap> = target_branches
            .iter()
            .map(|branch| branch.get(file_key).map(|p| &p.leaves).unwrap_or(&empty_leaves))
            .collect();

        // A merge-dir artifact entirely absent from the first target branch
        // is reported as one `Create File` row (L1=#NEW_METADATA#) rather
        // than one `Create Item` row per leaf.
        let primary_missing = target_branches
            .first()
            .map(|b| !b.contains_key(file_key))
            .unwrap_or(true);

        let is_overwrite = parsed.leaves.keys().any(|k| matches!(k.l1(), LevelKey::Overwrite));

        let (effective_leaves, effective_old_maps);
        if primary_missing && !is_overwrite {
            let mut synthetic = metatree_core::LeafMap::new();
            let whole_file = std::fs::read_to_string(source.join(&parsed.path)).unwrap_or_default();
            synthetic.insert(
                DiffKey::new(parsed.path.clone()).with_level(0, LevelKey::NewMetadata),
                whole_file,
            );
            effective_leaves = synthetic;
            effective_old_maps = vec![&empty_leaves; old_maps.len().max(1)];
        } else {
            effective_leaves = parsed.leaves.clone();
            effective_old_maps = old_maps;
        }

        let mut file_rows = diff_leaves(&parsed.path, &effective_leaves, &effective_old_maps);
        for row in &mut file_rows {
            row.metadata = file_key.to_string();
        }
        rows.push(file_rows);
    }

    let rows: Vec<DiffRow> = rows.into_iter().flatten().collect();
    Ok(DiffOutcome {
        rows,
        duplicates: report_rows(&duplicates),
    })
}

pub fn write_outputs(outcome: &DiffOutcome, out_csv: &Path) -> anyhow::Result<()> {
    csvio::write_diff_log(out_csv, &outcome.rows).context("writing diff log")?;

    if !outcome.duplicates.is_empty() {
        let dup_path = out_csv.with_file_name(format!(
            "{}-duplicates.csv",
            out_csv.file_stem().and_then(|s| s.to_str()).unwrap_or("diff")
        ));
        csvio::write_duplicates_csv(&dup_path, &outcome.duplicates).context("writing duplicates report")?;
        tracing::info!(path = %dup_path.display(), count = outcome.duplicates.len(), "wrote duplicate-key report");
    }

    Ok(())
}
