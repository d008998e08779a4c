//! Concurrent execution of independent migration jobs.
//!
//! Each job keeps its own ledger, output directory and workspaces; a
//! semaphore bounds how many run at once.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::domain::{JobResult, MigrationError};
use crate::orchestrator::{MigrationJob, Orchestrator};

/// Run `jobs` with at most `max_concurrent` in flight.
///
/// Results are returned in input order.
pub async fn run_jobs(
    orchestrator: Arc<Orchestrator>,
    jobs: Vec<MigrationJob>,
    max_concurrent: usize,
) -> Vec<Result<JobResult, MigrationError>> {
    let sem = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let tasks: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let orchestrator = Arc::clone(&orchestrator);
            let sem = Arc::clone(&sem);
            tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                orchestrator.run(job).await
            })
        })
        .collect();

    futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "migration job task failed");
                Err(MigrationError::TaskFailed(e.to_string()))
            }
        })
        .collect()
}

/// Whether every job ended `Accepted`.
pub fn all_accepted(results: &[Result<JobResult, MigrationError>]) -> bool {
    !results.is_empty()
        && results
            .iter()
            .all(|r| matches!(r, Ok(result) if result.is_accepted()))
}
