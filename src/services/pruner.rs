use crate::services::tree_mirror::ProducedPathSet;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use walkdir::WalkDir;

/// Delete every file under `output_root` that the last mirror did not produce.
///
/// Must only be called with the complete produced set of a finished mirror.
/// Deletion failures are logged and skipped. Directories left empty are then
/// removed bottom-up; `output_root` itself is kept. Paths that are not valid
/// UTF-8 are never touched.
///
/// Returns the number of files deleted.
pub fn prune(output_root: &Utf8Path, produced: &ProducedPathSet) -> usize {
    if !output_root.is_dir() {
        return 0;
    }

    let mut removed = 0;
    let mut directories: Vec<Utf8PathBuf> = Vec::new();

    // Contents first, so a directory always comes after everything inside it
    for entry in WalkDir::new(output_root)
        .follow_links(false)
        .contents_first(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Failed to read entry under {} while pruning: {}", output_root, e);
                continue;
            }
        };

        let Some(path) = Utf8Path::from_path(entry.path()) else {
            tracing::warn!("Not pruning non UTF-8 path {}", entry.path().display());
            continue;
        };

        if entry.file_type().is_dir() {
            if entry.depth() > 0 {
                directories.push(path.to_path_buf());
            }
            continue;
        }

        if produced.contains(path) {
            continue;
        }

        match fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("Removing file not in source tree: {}", path);
                removed += 1;
            }
            Err(e) => tracing::warn!("Failed to remove stale output {}: {}", path, e),
        }
    }

    // Best effort; anything still holding files stays
    for directory in directories {
        if fs::remove_dir(&directory).is_ok() {
            tracing::debug!("Removed empty directory {}", directory);
        }
    }

    removed
}

/// Delete every file under `kind_root` that lies outside all of `slots`.
///
/// Clears what an earlier root layout left in a kind's directory, for
/// example `java/com/..` from a single source root once there are several,
/// or the slot of a root that was removed. Files inside a slot belong to
/// that slot's own [`prune`]. Empty directories outside the slots are
/// removed afterwards; `kind_root` and the slots themselves are kept.
///
/// Returns the number of files deleted.
pub fn prune_outside(kind_root: &Utf8Path, slots: &[Utf8PathBuf]) -> usize {
    if !kind_root.is_dir() {
        return 0;
    }

    let in_slot = |path: &Utf8Path| slots.iter().any(|slot| path.starts_with(slot));
    let mut removed = 0;
    let mut directories: Vec<Utf8PathBuf> = Vec::new();

    for entry in WalkDir::new(kind_root)
        .follow_links(false)
        .contents_first(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Failed to read entry under {} while pruning: {}", kind_root, e);
                continue;
            }
        };

        let Some(path) = Utf8Path::from_path(entry.path()) else {
            tracing::warn!("Not pruning non UTF-8 path {}", entry.path().display());
            continue;
        };

        if in_slot(path) {
            continue;
        }

        if entry.file_type().is_dir() {
            if entry.depth() > 0 {
                directories.push(path.to_path_buf());
            }
            continue;
        }

        match fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("Removing output of a previous root layout: {}", path);
                removed += 1;
            }
            Err(e) => tracing::warn!("Failed to remove stale output {}: {}", path, e),
        }
    }

    // Ancestors of a slot still hold it and stay
    for directory in directories {
        if fs::remove_dir(&directory).is_ok() {
            tracing::debug!("Removed empty directory {}", directory);
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, root)
    }

    fn touch(path: &Utf8Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_removes_only_unproduced_files() {
        let (_temp_dir, root) = setup();
        let keep = root.join("a/Keep.java");
        let stale = root.join("a/Stale.java");
        let stale_nested = root.join("b/c/Old.xml");
        for path in [&keep, &stale, &stale_nested] {
            touch(path);
        }

        let produced: ProducedPathSet = [keep.clone()].into_iter().collect();
        let removed = prune(&root, &produced);

        assert_eq!(removed, 2);
        assert!(keep.exists());
        assert!(!stale.exists());
        assert!(!stale_nested.exists());
    }

    #[test]
    fn test_emptied_directories_removed_but_root_kept() {
        let (_temp_dir, root) = setup();
        let output_root = root.join("out");
        touch(&output_root.join("deep/er/Gone.java"));

        let removed = prune(&output_root, &ProducedPathSet::new());

        assert_eq!(removed, 1);
        assert!(!output_root.join("deep").exists());
        assert!(output_root.is_dir());
    }

    #[test]
    fn test_missing_output_root_is_noop() {
        let (_temp_dir, root) = setup();
        assert_eq!(prune(&root.join("missing"), &ProducedPathSet::new()), 0);
    }

    #[test]
    fn test_prune_outside_keeps_slots() {
        let (_temp_dir, root) = setup();
        let kind_root = root.join("java");
        let slot_a = kind_root.join("a");
        let slot_b = kind_root.join("b");
        let kept_a = slot_a.join("A.java");
        let kept_b = slot_b.join("deep/B.java");
        let old_layout = kind_root.join("com/example/A.java");
        let removed_root = kind_root.join("gone/C.java");
        for path in [&kept_a, &kept_b, &old_layout, &removed_root] {
            touch(path);
        }

        let removed = prune_outside(&kind_root, &[slot_a, slot_b]);

        assert_eq!(removed, 2);
        assert!(kept_a.exists());
        assert!(kept_b.exists());
        assert!(!kind_root.join("com").exists());
        assert!(!kind_root.join("gone").exists());
        assert!(kind_root.is_dir());
    }

    #[test]
    fn test_prune_outside_single_slot_is_kind_root() {
        let (_temp_dir, root) = setup();
        let kind_root = root.join("res");
        touch(&kind_root.join("values/strings.xml"));

        assert_eq!(prune_outside(&kind_root, &[kind_root.clone()]), 0);
        assert!(kind_root.join("values/strings.xml").exists());
    }
}
