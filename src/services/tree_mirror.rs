use crate::metrics::SyncStats;
use crate::models::PreprocessConfig;
use crate::services::file_sync;
use crate::services::runner::RootResolutionError;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Every output path one mirror produced, whether written, skipped or failed
pub type ProducedPathSet = HashSet<Utf8PathBuf>;

/// Extra file mirrored alongside the primary source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSpec {
    pub source: Utf8PathBuf,
    pub target: Utf8PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct MirrorReport {
    pub produced: ProducedPathSet,
    pub stats: SyncStats,
}

/// Task-level failures of a mirror
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error(transparent)]
    Root(#[from] RootResolutionError),

    #[error("Failed to walk {root}: {source}")]
    Walk {
        root: Utf8PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Where `source` lands when `source_root` is mirrored into `output_root`
///
/// Returns `None` when `source` is not under `source_root`.
pub fn output_path_for(
    source_root: &Utf8Path,
    output_root: &Utf8Path,
    source: &Utf8Path,
) -> Option<Utf8PathBuf> {
    source
        .strip_prefix(source_root)
        .ok()
        .map(|relative| output_root.join(relative))
}

fn is_mirrored_file(entry: &DirEntry) -> bool {
    // Symlinked files are mirrored through their target; symlinked
    // directories are never descended.
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}

/// Mirror every file under `source_root` into `output_root`.
///
/// Per-file sync failures are logged and counted but do not stop the walk;
/// their output path still goes into the produced set so that the previous
/// output survives pruning. A failure to enumerate a directory aborts the
/// whole mirror so that no partial set is ever handed to the pruner.
pub fn mirror(
    source_root: &Utf8Path,
    output_root: &Utf8Path,
    config: &PreprocessConfig,
    manifest: Option<&ManifestSpec>,
) -> Result<MirrorReport, MirrorError> {
    tracing::debug!("Mirroring {} into {}", source_root, output_root);

    let mut report = MirrorReport::default();

    for entry in WalkDir::new(source_root).follow_links(false) {
        let entry = entry.map_err(|source| MirrorError::Walk {
            root: source_root.to_path_buf(),
            source,
        })?;

        if !is_mirrored_file(&entry) {
            continue;
        }

        let Some(source) = Utf8Path::from_path(entry.path()) else {
            tracing::error!("Skipping non UTF-8 path {}", entry.path().display());
            report.stats.record_failure();
            continue;
        };

        let Some(dest) = output_path_for(source_root, output_root, source) else {
            tracing::error!("{} is outside of {}", source, source_root);
            report.stats.record_failure();
            continue;
        };

        sync_into(source, dest, config, &mut report);
    }

    if let Some(manifest) = manifest {
        if manifest.source.is_file() {
            sync_into(&manifest.source, manifest.target.clone(), config, &mut report);
        } else {
            tracing::debug!("No manifest at {}", manifest.source);
        }
    }

    Ok(report)
}

fn sync_into(
    source: &Utf8Path,
    dest: Utf8PathBuf,
    config: &PreprocessConfig,
    report: &mut MirrorReport,
) {
    match file_sync::sync(source, &dest, config) {
        Ok(action) => report.stats.record(action),
        Err(e) => {
            tracing::error!("Failed to sync {}: {}", source, e);
            report.stats.record_failure();
        }
    }
    report.produced.insert(dest);
}
