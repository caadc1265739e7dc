//! Directory walking, implemented with `walkdir`. Honors `excludeFiles`
//! (prefix match on the bare filename — preserved intentionally, the
//! default `excludeFiles: . package destructiveChanges` depends on it) and
//! classifies each discovered file's top-level directory against the
//! resolved `merge`/`overwrite` directory lists from C1.
//!
//! Only the first path segment is considered when deciding whether a file
//! falls under an overwrite root — nested overwrite roots are not
//! supported, and this is kept unchanged.

use std::path::{Path, PathBuf};

use metatree_core::Config;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirKind {
    Merge,
    Overwrite,
}

#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub relative_path: PathBuf,
    pub full_path: PathBuf,
    pub top_level_dir: String,
    pub kind: DirKind,
}

/// Walk `root`, keeping only regular files under a configured `merge` or
/// `overwrite` top-level directory whose bare filename is not excluded.
pub fn walk_repo(root: &Path, config: &Config) -> Vec<DiscoveredFile> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let full_path = entry.path().to_path_buf();
        let Ok(relative_path) = full_path.strip_prefix(root).map(|p| p.to_path_buf()) else {
            continue;
        };
        let Some(bare_name) = relative_path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if config.is_excluded_file(bare_name) {
            continue;
        }
        let Some(top_level_dir) = relative_path
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
        else {
            continue;
        };

        let kind = if config.is_merge_dir(top_level_dir) {
            DirKind::Merge
        } else if config.is_overwrite_dir(top_level_dir) {
            DirKind::Overwrite
        } else {
            continue;
        };

        found.push(DiscoveredFile {
            relative_path,
            full_path,
            top_level_dir: top_level_dir.to_string(),
            kind,
        });
    }

    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    found
}

/// Infer `(type, name)` for a file in an overwrite directory via the
/// configured `metadatamap-<dir>` rule: strip each listed suffix from the
/// bare filename (`#BASENAME#` means "part before the first dot").
pub fn infer_overwrite_type_name(config: &Config, top_level_dir: &str, bare_name: &str) -> Option<(String, String)> {
    let rules = config.global.metadatamap.get(top_level_dir)?;
    for rule in rules {
        for suffix in &rule.suffixes {
            let name = if suffix == "#BASENAME#" {
                bare_name.split('.').next().unwrap_or(bare_name).to_string()
            } else if let Some(stripped) = bare_name.strip_suffix(suffix.as_str()) {
                stripped.to_string()
            } else {
                continue;
            };
            return Some((rule.metadata_type.clone(), name));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use metatree_core::Config;

    fn config() -> Config {
        Config::parse(
            "\
merge=objects
overwrite=staticresources
excludeFiles=.
excludeFiles=package
metadatamap-staticresources=StaticResource #BASENAME#
",
        )
        .unwrap()
    }

    #[test]
    fn walks_only_configured_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("objects")).unwrap();
        std::fs::create_dir_all(dir.path().join("staticresources")).unwrap();
        std::fs::create_dir_all(dir.path().join("unrelated")).unwrap();
        std::fs::write(dir.path().join("objects/Account.object"), "x").unwrap();
        std::fs::write(dir.path().join("staticresources/Logo.resource"), "x").unwrap();
        std::fs::write(dir.path().join("unrelated/ignored.txt"), "x").unwrap();
        std::fs::write(dir.path().join("package.xml"), "x").unwrap();

        let found = walk_repo(dir.path(), &config());
        let names: Vec<_> = found
            .iter()
            .map(|f| f.relative_path.to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.contains("Account.object")));
        assert!(names.iter().any(|n| n.contains("Logo.resource")));
        assert!(!names.iter().any(|n| n.contains("unrelated")));
        assert!(!names.iter().any(|n| n.contains("package.xml")));
    }

    #[test]
    fn infers_type_and_name_via_basename_rule() {
        let (ty, name) = infer_overwrite_type_name(&config(), "staticresources", "Logo.resource").unwrap();
        assert_eq!(ty, "StaticResource");
        assert_eq!(name, "Logo");
    }
}
