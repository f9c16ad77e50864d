// tokenmirror - incremental source-tree mirroring with literal token substitution
//
// This is the library crate containing the mirroring engine and its configuration.
// The binary crate (main.rs) provides the command line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::SyncStats;
pub use models::{PreprocessConfig, PreprocessorSettings, RunContext};
pub use services::{ConfigError, RunResult, run_pass};
pub use state::{RunGuard, RunLock};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
