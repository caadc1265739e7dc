//! C7 — Reconstructor.
//!
//! Walks sections in original order. Standard sections whose `reconstruct`
//! mode is not `#DONOTSORT#` have their sub-sections sorted by case-folded
//! key (ties broken by original insertion order — a stable sort). Output is
//! written to `<file>.new`, then swapped in atomically: rename the original
//! to `<file>.orig`, rename `<file>.new` into place, delete `<file>.orig`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ReconstructMode;
use crate::error::{MetatreeError, Result};
use crate::section::SectionTree;

/// Render a section tree back to text, honoring each section's sort mode.
pub fn render(tree: &SectionTree) -> String {
    let mut out = String::new();
    for section in &tree.sections {
        if section.reconstruct == ReconstructMode::DoNotSort || section.entries.len() <= 1 {
            for entry in &section.entries {
                if !entry.deleted {
                    out.push_str(&entry.content);
                }
            }
            continue;
        }
        let mut entries: Vec<&crate::section::SubSection> = section.entries.iter().filter(|e| !e.deleted).collect();
        entries.sort_by_key(|e| e.sort_key.to_lowercase());
        for entry in entries {
            out.push_str(&entry.content);
        }
    }
    out
}

/// A scoped guard over the `.new`/`.orig` siblings of a target file. Its
/// `Drop` removes any leftovers unless `commit` already consumed it — so a
/// panic or early return mid-reconstruction can never leave a half-swapped
/// file masquerading as final output.
struct SwapGuard {
    new_path: PathBuf,
    orig_path: PathBuf,
    committed: bool,
}

impl SwapGuard {
    fn new(target: &Path) -> Self {
        SwapGuard {
            new_path: sibling(target, "new"),
            orig_path: sibling(target, "orig"),
            committed: false,
        }
    }
}

impl Drop for SwapGuard {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.new_path);
            let _ = fs::remove_file(&self.orig_path);
        }
    }
}

fn sibling(path: &Path, extra_ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(extra_ext);
    PathBuf::from(os)
}

/// Write the rendered text to `target` via the temp-file-then-rename
/// discipline: write `<target>.new`, rename `target` → `<target>.orig`
/// (skipped if `target` doesn't exist yet), rename `<target>.new` →
/// `target`, delete `<target>.orig`.
pub fn write_atomic(target: &Path, content: &str) -> Result<()> {
    let guard = SwapGuard::new(target);

    fs::write(&guard.new_path, content).map_err(|e| MetatreeError::Reconstruct {
        path: target.to_path_buf(),
        source: e,
    })?;

    let had_original = target.exists();
    if had_original {
        fs::rename(target, &guard.orig_path).map_err(|e| MetatreeError::Reconstruct {
            path: target.to_path_buf(),
            source: e,
        })?;
    }

    fs::rename(&guard.new_path, target).map_err(|e| MetatreeError::Reconstruct {
        path: target.to_path_buf(),
        source: e,
    })?;

    if had_original {
        let _ = fs::remove_file(&guard.orig_path);
    }

    let mut guard = guard;
    guard.committed = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconstructMode;
    use crate::keysynth::Shape;
    use crate::section::{Section, SectionKind, SubSection};

    #[test]
    fn sorts_sub_sections_case_folded_with_stable_ties() {
        let mut section = Section::new("fields", SectionKind::Standard, ReconstructMode::Sort);
        section.entries.push(SubSection::new("bob", Shape::Simple, "bob\n"));
        section.entries.push(SubSection::new("Alice", Shape::Simple, "Alice\n"));
        section.entries.push(SubSection::new("alice", Shape::Simple, "alice-lower\n"));
        let tree = SectionTree {
            metadata_type: "CustomObject".to_string(),
            metadata_name: "Account".to_string(),
            sections: vec![section],
        };
        let rendered = render(&tree);
        assert_eq!(rendered, "Alice\nalice-lower\nbob\n");
    }

    #[test]
    fn deleted_entries_are_skipped() {
        let mut section = Section::new("fields", SectionKind::Standard, ReconstructMode::Sort);
        let mut kept = SubSection::new("a", Shape::Simple, "a\n");
        kept.deleted = false;
        let mut gone = SubSection::new("b", Shape::Simple, "b\n");
        gone.deleted = true;
        section.entries.push(kept);
        section.entries.push(gone);
        let tree = SectionTree {
            metadata_type: "CustomObject".to_string(),
            metadata_name: "Account".to_string(),
            sections: vec![section],
        };
        assert_eq!(render(&tree), "a\n");
    }

    #[test]
    fn write_atomic_swaps_in_new_content_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("Account.object");
        fs::write(&target, "old\n").unwrap();

        write_atomic(&target, "new\n").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new\n");
        assert!(!sibling(&target, "orig").exists());
        assert!(!sibling(&target, "new").exists());
    }

    #[test]
    fn write_atomic_creates_file_that_does_not_exist_yet() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("NewObject.object");

        write_atomic(&target, "fresh\n").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "fresh\n");
    }
}
