//! Data models for tokenmirror.
//!
//! - [`PreprocessorSettings`]: the user-editable settings loaded from `preprocessor.yaml`
//! - [`RunContext`]: fully resolved, immutable inputs for one pass
//! - [`PreprocessConfig`]: the eligible extensions and compiled rules shared by every task
//! - [`RootKind`]: source versus resource roots and their output directories

pub mod config;
pub mod run_context;

pub use config::{
    DEFAULT_MANIFEST, DEFAULT_RESOURCE_ROOT, DEFAULT_SOURCE_ROOT, DEFAULT_TARGET,
    PreprocessorSettings, ReplaceMap, ReplaceValue,
};
pub use run_context::{PreprocessConfig, RootKind, RunContext};
