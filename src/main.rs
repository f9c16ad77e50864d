//! tokenmirror - incremental source-tree mirroring with literal token substitution
//!
//! Command line entry point.
//!
//! # Execution Flow
//!
//! 1. Parse arguments and initialize logging (daily rotating file + stderr)
//! 2. Load `preprocessor.yaml` from the project directory
//! 3. Resolve it into a [`RunContext`](tokenmirror::RunContext)
//! 4. Create a tokio runtime with 4 worker threads and run one guarded pass
//! 5. Shutdown the runtime with a 5s timeout
//!
//! # Exit Codes
//!
//! - `0`: every root mirrored without failures
//! - `1`: at least one root failed, or the wait timed out
//! - `2`: configuration could not be loaded or resolved

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;
use tokenmirror::services::plan_tasks;
use tokenmirror::{APP_NAME, ConfigManager, RunLock, VERSION, run_pass};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project directory; relative paths in the settings resolve against it.
    #[arg(long, short, global = true, default_value = ".")]
    project_dir: Utf8PathBuf,

    /// Settings file to use instead of `<project-dir>/preprocessor.yaml`.
    #[arg(long, short, global = true)]
    config: Option<Utf8PathBuf>,

    /// Log every file, including the ones already up to date.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    /// Directory for log files, relative to the project directory.
    #[arg(long, global = true, default_value = "build/logs")]
    log_dir: Utf8PathBuf,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Mirror every configured root into the target (the default).
    Run,
    /// Write a default settings file if none exists.
    Init,
    /// Load and resolve the settings and print the plan without touching files.
    Check,
}

const EXIT_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_cli(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn run_cli(cli: &Cli) -> Result<ExitCode> {
    let manager = match &cli.config {
        Some(config) => ConfigManager::with_config_path(&cli.project_dir, config)?,
        None => ConfigManager::new(&cli.project_dir)?,
    };

    let log_dir = manager.project_dir().join(&cli.log_dir);
    let _guard = tokenmirror::logging::setup_logging_with_console(
        &log_dir,
        APP_NAME,
        cli.verbose,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => {
            if manager.init_settings()? {
                println!("Wrote default settings to {}", manager.config_path());
            } else {
                println!("Settings already exist at {}", manager.config_path());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => check(&manager, cli.verbose),
        Commands::Run => run(&manager, cli.verbose),
    }
}

fn check(manager: &ConfigManager, verbose: bool) -> Result<ExitCode> {
    let mut settings = manager.load_settings()?;
    settings.verbose |= verbose;
    let ctx = manager.resolve(&settings)?;

    println!("Target: {}", ctx.target);
    println!(
        "Extensions: {}",
        ctx.config
            .extensions()
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Replacement tokens: {}", ctx.config.rules().len());

    let mut resolved = true;
    for task in plan_tasks(&ctx) {
        match &task.output_root {
            Ok(output_root) => println!("  {} -> {}", task.label(), output_root),
            Err(e) => {
                resolved = false;
                println!("  {}: {}", task.label(), e);
            }
        }
    }

    Ok(if resolved {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}

fn run(manager: &ConfigManager, verbose: bool) -> Result<ExitCode> {
    let mut settings = manager.load_settings()?;
    settings.verbose |= verbose;
    let ctx = manager.resolve(&settings)?;

    // File work runs on the blocking pool; these threads only coordinate
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("tokenmirror-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", 4);

    let lock = RunLock::new();
    let result = runtime.block_on(run_pass(&lock, ctx));

    runtime.shutdown_timeout(Duration::from_secs(5));

    for outcome in result.failed() {
        eprintln!("Failed: {}", outcome.label);
    }
    for outcome in result.incomplete() {
        eprintln!("Incomplete: {}", outcome.label);
    }

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}
