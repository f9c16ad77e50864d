use crate::models::PreprocessConfig;
use camino::{Utf8Path, Utf8PathBuf};
use filetime::FileTime;
use std::fs;
use std::io;
use thiserror::Error;

/// What [`sync`] did for one input/output pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Output was stale and has been replaced by a byte copy of the input
    Copied,
    /// Output was stale and has been rewritten with tokens substituted
    Processed,
    /// Output was already up to date
    Skipped,
}

/// Errors that can occur while synchronizing a single file
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Io { path, .. } => path,
        }
    }
}

fn io_error(path: &Utf8Path) -> impl FnOnce(io::Error) -> SyncError {
    let path = path.to_path_buf();
    move |source| SyncError::Io { path, source }
}

/// Snapshot of the input side of one file pair, taken fresh on every run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub modified: FileTime,
    pub size: u64,
}

impl FileRecord {
    pub fn read(input: &Utf8Path, output: &Utf8Path) -> Result<Self, SyncError> {
        let metadata = fs::metadata(input).map_err(io_error(input))?;
        Ok(Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            modified: FileTime::from_last_modification_time(&metadata),
            size: metadata.len(),
        })
    }
}

/// Whether the output of `record` needs to be (re)written.
///
/// The output is stale when it is missing or its modification time differs
/// from the input's. Copied outputs must also match the input's size; a
/// processed output legitimately differs in size once tokens are replaced, so
/// only its modification time is compared.
pub fn is_stale(record: &FileRecord, processed: bool) -> Result<bool, SyncError> {
    let metadata = match fs::metadata(&record.output) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(io_error(&record.output)(e)),
    };

    if FileTime::from_last_modification_time(&metadata) != record.modified {
        return Ok(true);
    }

    Ok(!processed && metadata.len() != record.size)
}

/// Bring `dest` up to date with `source`.
///
/// Eligible files are read as UTF-8, run through the substitution rules and
/// written out; everything else is copied byte for byte. Either way the
/// output gets the input's modification time so the next run sees it as
/// current. Missing parent directories of `dest` are created.
pub fn sync(
    source: &Utf8Path,
    dest: &Utf8Path,
    config: &PreprocessConfig,
) -> Result<SyncAction, SyncError> {
    let record = FileRecord::read(source, dest)?;
    let eligible = source
        .extension()
        .is_some_and(|ext| config.is_eligible_for_substitution(ext));

    if !is_stale(&record, eligible)? {
        let verb = if eligible { "process" } else { "copy" };
        trace_action!(config.is_verbose(), "No need to {} {}", verb, source);
        return Ok(SyncAction::Skipped);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let action = if eligible {
        tracing::info!("PROCESS {} -> {}", source, dest);
        let content = fs::read_to_string(source).map_err(io_error(source))?;
        let content = config.rules().apply(&content);
        fs::write(dest, content).map_err(io_error(dest))?;
        SyncAction::Processed
    } else {
        trace_action!(config.is_verbose(), "COPY {} -> {}", source, dest);
        fs::copy(source, dest).map_err(io_error(dest))?;
        SyncAction::Copied
    };

    filetime::set_file_mtime(dest, record.modified).map_err(io_error(dest))?;

    Ok(action)
}
