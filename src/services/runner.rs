use crate::metrics::{Metrics, SyncStats};
use crate::models::{PreprocessConfig, RootKind, RunContext};
use crate::services::pruner;
use crate::services::tree_mirror::{self, ManifestSpec, MirrorError};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Why a root could not be given an output slot
///
/// Raised while planning but reported from the root's own task, so siblings
/// still run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RootResolutionError {
    #[error("{0} is not an existing directory")]
    NotADirectory(Utf8PathBuf),

    #[error("{0} has no final path component to name its output")]
    NoFinalComponent(Utf8PathBuf),

    #[error("{root} would be mirrored into {slot}, already used by {previous}")]
    DuplicateSlot {
        root: Utf8PathBuf,
        slot: Utf8PathBuf,
        previous: Utf8PathBuf,
    },

    #[error("{root} overlaps its output {output}")]
    Overlap {
        root: Utf8PathBuf,
        output: Utf8PathBuf,
    },
}

/// One source root to mirror, with where its output goes
#[derive(Debug, Clone)]
pub struct MirrorTask {
    pub kind: RootKind,
    pub source_root: Utf8PathBuf,
    /// `<target>/<kind dir>`, shared by every root of this kind
    pub kind_root: Utf8PathBuf,
    pub output_root: Result<Utf8PathBuf, RootResolutionError>,
    pub manifest: Option<ManifestSpec>,
}

impl MirrorTask {
    pub fn label(&self) -> String {
        format!("{} root {}", self.kind.label(), self.source_root)
    }

    /// Mirror, then prune this task's output subtree
    pub fn execute(&self, config: &PreprocessConfig) -> Result<SyncStats, MirrorError> {
        let output_root = self.output_root.clone()?;

        let report = tree_mirror::mirror(
            &self.source_root,
            &output_root,
            config,
            self.manifest.as_ref(),
        )?;

        let mut stats = report.stats;
        stats.pruned = pruner::prune(&output_root, &report.produced);
        Ok(stats)
    }
}

/// Build one task per source root, then one per resource root.
///
/// A lone root of a kind is mirrored straight into the kind's directory under
/// the target (`java` or `res`). With several roots of a kind, each gets
/// `<kind dir>/<final component of the root>` so no two tasks write the same
/// subtree. Only the first source root carries the manifest.
pub fn plan_tasks(ctx: &RunContext) -> Vec<MirrorTask> {
    let mut tasks = Vec::new();

    for kind in [RootKind::Source, RootKind::Resource] {
        let roots = ctx.roots(kind);
        let base = ctx.target.join(kind.target_dir());
        let single = roots.len() == 1;
        let mut slots: HashMap<Utf8PathBuf, Utf8PathBuf> = HashMap::new();

        for (index, root) in roots.iter().enumerate() {
            let output_root = resolve_output_root(root, &base, single, &mut slots);
            let manifest = match (kind, index) {
                (RootKind::Source, 0) => root.parent().map(|parent| ManifestSpec {
                    source: parent.join(&ctx.manifest_name),
                    target: ctx.manifest_target(),
                }),
                _ => None,
            };

            tasks.push(MirrorTask {
                kind,
                source_root: root.clone(),
                kind_root: base.clone(),
                output_root,
                manifest,
            });
        }
    }

    tasks
}

fn resolve_output_root(
    root: &Utf8Path,
    base: &Utf8Path,
    single: bool,
    slots: &mut HashMap<Utf8PathBuf, Utf8PathBuf>,
) -> Result<Utf8PathBuf, RootResolutionError> {
    if !root.is_dir() {
        return Err(RootResolutionError::NotADirectory(root.to_path_buf()));
    }

    let slot = if single {
        base.to_path_buf()
    } else {
        let name = root
            .file_name()
            .ok_or_else(|| RootResolutionError::NoFinalComponent(root.to_path_buf()))?;
        base.join(name)
    };

    // Either containment would make the pruner or the walk see the other tree
    if slot.starts_with(root) || root.starts_with(&slot) {
        return Err(RootResolutionError::Overlap {
            root: root.to_path_buf(),
            output: slot,
        });
    }

    if let Some(previous) = slots.get(&slot) {
        return Err(RootResolutionError::DuplicateSlot {
            root: root.to_path_buf(),
            slot,
            previous: previous.clone(),
        });
    }

    slots.insert(slot.clone(), root.to_path_buf());
    Ok(slot)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Succeeded,
    Failed(String),
    /// Still running when the wait timed out
    Incomplete,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub label: String,
    pub kind: RootKind,
    pub source_root: Utf8PathBuf,
    pub status: TaskStatus,
    pub stats: SyncStats,
}

/// Outcome of one full pass across every root
#[derive(Debug, Clone)]
pub struct RunResult {
    pub outcomes: Vec<TaskOutcome>,
    pub stats: SyncStats,
    pub timed_out: bool,
    pub duration: Duration,
}

impl RunResult {
    /// Every task finished and none failed
    pub fn is_success(&self) -> bool {
        !self.timed_out
            && self
                .outcomes
                .iter()
                .all(|outcome| outcome.status == TaskStatus::Succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.status, TaskStatus::Failed(_)))
    }

    pub fn incomplete(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == TaskStatus::Incomplete)
    }
}

/// Where the roots of one kind write, for clearing out earlier layouts
#[derive(Debug)]
struct KindLayout {
    kind: RootKind,
    kind_root: Utf8PathBuf,
    slots: Vec<Utf8PathBuf>,
}

fn kind_layouts(tasks: &[MirrorTask]) -> Vec<KindLayout> {
    [RootKind::Source, RootKind::Resource]
        .into_iter()
        .filter_map(|kind| {
            let mut of_kind = tasks.iter().filter(|task| task.kind == kind).peekable();
            let kind_root = of_kind.peek()?.kind_root.clone();
            let slots = of_kind
                .filter_map(|task| task.output_root.as_ref().ok().cloned())
                .collect();
            Some(KindLayout {
                kind,
                kind_root,
                slots,
            })
        })
        .collect()
}

/// Fans mirror tasks out over a fixed number of blocking workers
#[derive(Debug, Clone)]
pub struct ConcurrentRunner {
    pool_size: usize,
    timeout: Duration,
}

impl ConcurrentRunner {
    pub fn new(pool_size: usize, timeout: Duration) -> Self {
        Self {
            pool_size: pool_size.max(1),
            timeout,
        }
    }

    /// Run every task and wait for all of them, at most `timeout`.
    ///
    /// All tasks are spawned at once and queue on a semaphore with
    /// `pool_size` permits; each one does its file work on the blocking pool.
    /// A failed or panicking task is recorded without affecting the others.
    /// Tasks still running at the deadline are detached and left to finish
    /// on their own; they are reported as [`TaskStatus::Incomplete`].
    ///
    /// Once every task of a kind has succeeded, files in the kind's directory
    /// outside all of its slots are pruned. This is skipped for a kind with a
    /// failed task and for the whole run when the wait timed out.
    pub async fn run(&self, tasks: Vec<MirrorTask>, config: Arc<PreprocessConfig>) -> RunResult {
        self.run_holding(tasks, config, Arc::new(())).await
    }

    /// Like [`run`](Self::run), with a clone of `hold` kept alive by every
    /// worker until its file work ends.
    ///
    /// Passing a [`RunGuard`](crate::state::RunGuard) keeps the run lock
    /// taken by workers that outlive a timed-out wait.
    pub async fn run_holding<H>(
        &self,
        tasks: Vec<MirrorTask>,
        config: Arc<PreprocessConfig>,
        hold: Arc<H>,
    ) -> RunResult
    where
        H: Send + Sync + 'static,
    {
        let started = Instant::now();
        let metrics = Arc::new(Metrics::new());
        let semaphore = Arc::new(Semaphore::new(self.pool_size));

        tracing::info!(
            "Mirroring {} roots (max concurrent: {})",
            tasks.len(),
            self.pool_size
        );

        let mut outcomes: Vec<TaskOutcome> = tasks
            .iter()
            .map(|task| TaskOutcome {
                label: task.label(),
                kind: task.kind,
                source_root: task.source_root.clone(),
                status: TaskStatus::Incomplete,
                stats: SyncStats::default(),
            })
            .collect();
        let mut finished = vec![false; outcomes.len()];
        let layouts = kind_layouts(&tasks);

        let mut set = JoinSet::new();
        for (index, task) in tasks.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let config = Arc::clone(&config);
            let metrics = Arc::clone(&metrics);
            let hold = Arc::clone(&hold);

            set.spawn(async move {
                // The semaphore is never closed
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, Err("worker pool closed".to_string()));
                };

                let joined = tokio::task::spawn_blocking(move || {
                    let _hold = hold;
                    tracing::info!("Mirroring {}", task.label());
                    task.execute(&config)
                })
                .await;

                let result = match joined {
                    Ok(Ok(stats)) => {
                        metrics.record_task_stats(&stats);
                        Ok(stats)
                    }
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(e) => Err(format!("worker panicked: {}", e)),
                };
                (index, result)
            });
        }

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let timed_out = loop {
            tokio::select! {
                biased;

                _ = &mut deadline => break !set.is_empty(),
                joined = set.join_next() => match joined {
                    None => break false,
                    Some(Ok((index, result))) => {
                        finished[index] = true;
                        let outcome = &mut outcomes[index];
                        match result {
                            Ok(stats) if stats.failed == 0 => {
                                tracing::info!(
                                    "Completed {}: {} processed, {} copied, {} up to date, {} pruned",
                                    outcome.label,
                                    stats.processed,
                                    stats.copied,
                                    stats.skipped,
                                    stats.pruned
                                );
                                outcome.status = TaskStatus::Succeeded;
                                outcome.stats = stats;
                            }
                            Ok(stats) => {
                                tracing::error!("{} finished with {} failed files", outcome.label, stats.failed);
                                metrics.record_task_failed();
                                outcome.status =
                                    TaskStatus::Failed(format!("{} files failed to sync", stats.failed));
                                outcome.stats = stats;
                            }
                            Err(reason) => {
                                tracing::error!("{} failed: {}", outcome.label, reason);
                                metrics.record_task_failed();
                                outcome.status = TaskStatus::Failed(reason);
                            }
                        }
                    }
                    Some(Err(e)) => tracing::error!("Task join error: {}", e),
                },
            }
        };

        if timed_out {
            set.detach_all();
            for (outcome, _) in outcomes
                .iter()
                .zip(&finished)
                .filter(|(_, finished)| !**finished)
            {
                metrics.record_task_incomplete();
                tracing::warn!("{} still running at the deadline", outcome.label);
            }
            tracing::warn!(
                "Timed out after {:?} waiting for mirror tasks; output may be incomplete",
                self.timeout
            );
        } else {
            for layout in layouts {
                let settled = outcomes
                    .iter()
                    .filter(|outcome| outcome.kind == layout.kind)
                    .all(|outcome| outcome.status == TaskStatus::Succeeded);
                if !settled {
                    tracing::warn!(
                        "Not clearing {}: a {} root failed",
                        layout.kind_root,
                        layout.kind.label()
                    );
                    continue;
                }

                let pruned = tokio::task::spawn_blocking(move || {
                    pruner::prune_outside(&layout.kind_root, &layout.slots)
                })
                .await;
                match pruned {
                    Ok(pruned) => metrics.record_task_stats(&SyncStats {
                        pruned,
                        ..SyncStats::default()
                    }),
                    Err(e) => tracing::error!("Clearing earlier layout panicked: {}", e),
                }
            }
        }

        metrics.log_summary();

        RunResult {
            outcomes,
            stats: metrics.snapshot(),
            timed_out,
            duration: started.elapsed(),
        }
    }
}
