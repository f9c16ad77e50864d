//! Services module - the mirroring and substitution engine.
//!
//! Everything here is plain file I/O plus tokio for the worker pool; nothing
//! depends on how the run was triggered.
//!
//! # Components
//!
//! - [`substitution`]: compiles the ordered token map into literal-match rules
//! - [`file_sync`]: staleness check and copy-or-process for one file pair
//! - [`tree_mirror`]: walks one root and syncs every file, collecting the
//!   produced output paths
//! - [`pruner`]: deletes outputs that the last mirror did not produce, and
//!   outputs left by an earlier root layout
//! - [`runner`]: plans one task per root and runs them on a bounded pool
//! - [`preprocessor`]: the guarded entry point for a full pass
//!
//! # Usage Example
//!
//! ```ignore
//! use tokenmirror::{ConfigManager, RunLock, services::run_pass};
//!
//! let manager = ConfigManager::new(project_dir)?;
//! let ctx = manager.resolve(&manager.load_settings()?)?;
//!
//! let lock = RunLock::new();
//! let result = run_pass(&lock, ctx).await;
//! assert!(result.is_success());
//! ```

// Per-file chatter: info when the run is verbose, debug otherwise
macro_rules! trace_action {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod file_sync;
pub mod preprocessor;
pub mod pruner;
pub mod runner;
pub mod substitution;
pub mod tree_mirror;

pub use file_sync::{SyncAction, SyncError, sync};
pub use preprocessor::run_pass;
pub use pruner::{prune, prune_outside};
pub use runner::{
    ConcurrentRunner, MirrorTask, RootResolutionError, RunResult, TaskOutcome, TaskStatus,
    plan_tasks,
};
pub use substitution::{CompiledRules, ConfigError, SubstitutionRule};
pub use tree_mirror::{ManifestSpec, MirrorError, MirrorReport, ProducedPathSet, mirror};
