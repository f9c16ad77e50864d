// Run metrics module
//
// Per-task file counters and lock-free aggregates across concurrent tasks

use crate::services::file_sync::SyncAction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// File counts for one mirror task, or for a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub copied: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pruned: usize,
}

impl SyncStats {
    pub fn record(&mut self, action: SyncAction) {
        match action {
            SyncAction::Copied => self.copied += 1,
            SyncAction::Processed => self.processed += 1,
            SyncAction::Skipped => self.skipped += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Files visited by the walk, whatever happened to them
    pub fn files_seen(&self) -> usize {
        self.copied + self.processed + self.skipped + self.failed
    }

    /// Files actually written this run
    pub fn files_written(&self) -> usize {
        self.copied + self.processed
    }
}

/// Run-wide performance metrics
///
/// Uses atomic operations so every worker can report without locks. The
/// runner folds each finished task's [`SyncStats`] in and logs a summary at
/// the end of the pass.
#[derive(Debug)]
pub struct Metrics {
    pub files_copied: AtomicUsize,
    pub files_processed: AtomicUsize,
    pub files_skipped: AtomicUsize,
    pub files_failed: AtomicUsize,
    pub files_pruned: AtomicUsize,

    /// Tasks that finished with a failure of any kind
    pub tasks_failed: AtomicUsize,

    /// Tasks still running when the wait timed out
    pub tasks_incomplete: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            files_copied: AtomicUsize::new(0),
            files_processed: AtomicUsize::new(0),
            files_skipped: AtomicUsize::new(0),
            files_failed: AtomicUsize::new(0),
            files_pruned: AtomicUsize::new(0),
            tasks_failed: AtomicUsize::new(0),
            tasks_incomplete: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Fold one task's counts into the totals
    pub fn record_task_stats(&self, stats: &SyncStats) {
        self.files_copied.fetch_add(stats.copied, Ordering::Relaxed);
        self.files_processed
            .fetch_add(stats.processed, Ordering::Relaxed);
        self.files_skipped.fetch_add(stats.skipped, Ordering::Relaxed);
        self.files_failed.fetch_add(stats.failed, Ordering::Relaxed);
        self.files_pruned.fetch_add(stats.pruned, Ordering::Relaxed);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_incomplete(&self) {
        self.tasks_incomplete.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncStats {
        SyncStats {
            copied: self.files_copied.load(Ordering::Relaxed),
            processed: self.files_processed.load(Ordering::Relaxed),
            skipped: self.files_skipped.load(Ordering::Relaxed),
            failed: self.files_failed.load(Ordering::Relaxed),
            pruned: self.files_pruned.load(Ordering::Relaxed),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn log_summary(&self) {
        let stats = self.snapshot();
        tracing::info!("=== Preprocessing Summary ===");
        tracing::info!("Elapsed: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Files: {} processed, {} copied, {} up to date, {} failed, {} pruned",
            stats.processed,
            stats.copied,
            stats.skipped,
            stats.failed,
            stats.pruned
        );
        tracing::info!(
            "Tasks: {} failed, {} incomplete",
            self.tasks_failed.load(Ordering::Relaxed),
            self.tasks_incomplete.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot(), SyncStats::default());
        assert_eq!(metrics.tasks_failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_stats_record_actions() {
        let mut stats = SyncStats::default();
        stats.record(SyncAction::Copied);
        stats.record(SyncAction::Processed);
        stats.record(SyncAction::Processed);
        stats.record(SyncAction::Skipped);
        stats.record_failure();

        assert_eq!(stats.copied, 1);
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.files_seen(), 5);
        assert_eq!(stats.files_written(), 3);
    }

    #[test]
    fn test_task_stats_aggregate_across_threads() {
        let metrics = Arc::new(Metrics::new());
        let stats = SyncStats {
            copied: 1,
            processed: 2,
            skipped: 3,
            failed: 0,
            pruned: 1,
        };

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || metrics.record_task_stats(&stats))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = metrics.snapshot();
        assert_eq!(total.copied, 4);
        assert_eq!(total.processed, 8);
        assert_eq!(total.skipped, 12);
        assert_eq!(total.pruned, 4);
    }

    #[test]
    fn test_task_counters() {
        let metrics = Metrics::new();
        metrics.record_task_failed();
        metrics.record_task_incomplete();
        metrics.record_task_incomplete();

        assert_eq!(metrics.tasks_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.tasks_incomplete.load(Ordering::Relaxed), 2);
    }
}
