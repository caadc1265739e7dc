//! The `package` subcommand: assembles a deployment package directory
//! containing only the changed artifacts named by `Create Item`/`Update
//! Item`/`Create File`/`Update File` rows, plus a `package.xml` manifest
//! and, when any `Delete *` rows are present, a `destructiveChanges.xml`.
//! File-copying and XML templating only — no algorithmic content.
//!
//! The source tool this crate reimplements emits destructive members from
//! the *same* map used for the regular package manifest — a
//! variable-shadowing quirk flagged for review rather than replicated
//! blindly. This implementation keeps the two maps separate — a
//! destructive manifest listing members still present in the *additive*
//! package map would be self-contradictory (deploy and delete the same
//! member in one release) — see `DESIGN.md` for the recorded decision.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use metatree_core::{DiffRow, MergeAction};

/// `TYPE -> {NAME, ...}`, ordered for deterministic manifest output.
type MemberMap = BTreeMap<String, BTreeSet<String>>;

pub struct PackageOutcome {
    pub copied_files: Vec<PathBuf>,
    pub package_members: MemberMap,
    pub destructive_members: MemberMap,
}

fn split_metadata(metadata: &str) -> Option<(String, String)> {
    metadata.split_once('=').map(|(t, n)| (t.to_string(), n.to_string()))
}

pub fn run(rows: &[DiffRow], source: &Path, out_dir: &Path) -> anyhow::Result<PackageOutcome> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating package directory {}", out_dir.display()))?;

    let mut package_members: MemberMap = BTreeMap::new();
    let mut destructive_members: MemberMap = BTreeMap::new();
    let mut copied_files = Vec::new();
    let mut copied_paths = BTreeSet::new();

    for row in rows {
        let Some((metadata_type, name)) = split_metadata(&row.metadata) else {
            continue;
        };

        match row.merge_action {
            MergeAction::CreateFile | MergeAction::UpdateFile | MergeAction::CreateItem | MergeAction::UpdateItem => {
                package_members.entry(metadata_type).or_default().insert(name);

                if copied_paths.insert(row.path.clone()) {
                    let src_path = source.join(&row.path);
                    let dst_path = out_dir.join(&row.path);
                    if let Some(parent) = dst_path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    match std::fs::copy(&src_path, &dst_path) {
                        Ok(_) => copied_files.push(PathBuf::from(&row.path)),
                        Err(err) => {
                            tracing::error!(path = %src_path.display(), %err, "failed to copy artifact into package");
                        }
                    }
                }
            }
            MergeAction::DeleteFile | MergeAction::DeleteItem => {
                destructive_members.entry(metadata_type).or_default().insert(name);
            }
        }
    }

    write_manifest(&out_dir.join("package.xml"), &package_members)?;
    if !destructive_members.is_empty() {
        write_manifest(&out_dir.join("destructiveChanges.xml"), &destructive_members)?;
    }

    Ok(PackageOutcome {
        copied_files,
        package_members,
        destructive_members,
    })
}

const API_VERSION: &str = "61.0";

fn write_manifest(path: &Path, members: &MemberMap) -> anyhow::Result<()> {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<Package xmlns=\"http://soap.sforce.com/2006/04/metadata\">\n");
    for (metadata_type, names) in members {
        xml.push_str("    <types>\n");
        for name in names {
            xml.push_str(&format!("        <members>{name}</members>\n"));
        }
        xml.push_str(&format!("        <name>{metadata_type}</name>\n"));
        xml.push_str("    </types>\n");
    }
    xml.push_str(&format!("    <version>{API_VERSION}</version>\n"));
    xml.push_str("</Package>\n");

    std::fs::write(path, xml).with_context(|| format!("writing manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(action: MergeAction, metadata: &str, path: &str) -> DiffRow {
        DiffRow {
            dev_work_log_name: String::new(),
            request_timestamp: String::new(),
            work_team: String::new(),
            developer_name: String::new(),
            user_story: String::new(),
            merge_action: action,
            metadata: metadata.to_string(),
            path: path.to_string(),
            l1_key: String::new(),
            l2_key: String::new(),
            l3_key: String::new(),
            l4_key: String::new(),
            new_value: String::new(),
            old_values: vec![],
        }
    }

    #[test]
    fn assembles_package_and_destructive_manifests_separately() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let out = dir.path().join("out");
        std::fs::create_dir_all(source.join("objects")).unwrap();
        std::fs::write(source.join("objects/Account.object"), "<CustomObject/>").unwrap();

        let rows = vec![
            row(MergeAction::CreateItem, "CustomObject=Account", "objects/Account.object"),
            row(MergeAction::DeleteItem, "CustomObject=Contact", "objects/Contact.object"),
        ];

        let outcome = run(&rows, &source, &out).unwrap();
        assert_eq!(outcome.copied_files, vec![PathBuf::from("objects/Account.object")]);
        assert!(outcome.package_members["CustomObject"].contains("Account"));
        assert!(!outcome.package_members["CustomObject"].contains("Contact"));
        assert!(outcome.destructive_members["CustomObject"].contains("Contact"));

        assert!(out.join("package.xml").exists());
        assert!(out.join("destructiveChanges.xml").exists());
        let pkg_xml = std::fs::read_to_string(out.join("package.xml")).unwrap();
        assert!(pkg_xml.contains("<members>Account</members>"));
        assert!(!pkg_xml.contains("Contact"));
    }

    #[test]
    fn no_destructive_manifest_when_nothing_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&source).unwrap();

        let outcome = run(&[], &source, &out).unwrap();
        assert!(outcome.destructive_members.is_empty());
        assert!(!out.join("destructiveChanges.xml").exists());
        assert!(out.join("package.xml").exists());
    }
}
