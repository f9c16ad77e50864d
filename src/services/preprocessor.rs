use crate::models::RunContext;
use crate::services::runner::{ConcurrentRunner, RunResult, plan_tasks};
use crate::state::RunLock;
use std::sync::Arc;

/// Perform one full preprocessing pass under `lock`.
///
/// Waits for any pass already holding the lock, then plans one task per
/// source root and per resource root and runs them on a pool of
/// `ctx.pool_size` workers. Root and file failures are reported in the
/// returned [`RunResult`]; they never abort the pass.
///
/// After a timeout this returns while detached workers may still be writing.
/// They keep the lock until they finish, so the next pass waits for them.
pub async fn run_pass(lock: &RunLock, ctx: RunContext) -> RunResult {
    let guard = lock.acquire().await;
    tracing::info!("Starting token preprocessor, target {}", ctx.target);

    let tasks = plan_tasks(&ctx);
    let runner = ConcurrentRunner::new(ctx.pool_size, ctx.timeout);
    let result = runner
        .run_holding(tasks, Arc::clone(&ctx.config), guard)
        .await;

    let seconds = result.duration.as_secs_f64();
    if result.is_success() {
        tracing::info!("Preprocessing completed in {:.2}s", seconds);
    } else if result.timed_out {
        tracing::warn!(
            "Preprocessing possibly incomplete after {:.2}s; {} roots still running",
            seconds,
            result.incomplete().count()
        );
    } else {
        tracing::error!(
            "Preprocessing finished with {} failed roots in {:.2}s",
            result.failed().count(),
            seconds
        );
    }

    result
}
