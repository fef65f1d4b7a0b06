use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::jobs::model::{JobStatus, TaskStatus};
use crate::jobs::store::JobStore;

/// Aggregate status for a job given the statuses of all its tasks.
///
/// `None` means there is nothing to write yet: no tasks, or at least one
/// task still `queued`/`processing`.
pub fn aggregate_status(statuses: &[TaskStatus]) -> Option<JobStatus> {
    if statuses.is_empty() || statuses.iter().any(|s| !s.is_terminal()) {
        return None;
    }

    let published = statuses
        .iter()
        .filter(|s| **s == TaskStatus::Published)
        .count();

    Some(if published == statuses.len() {
        JobStatus::Published
    } else if published == 0 {
        JobStatus::Failed
    } else {
        JobStatus::Partial
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinalizeSummary {
    pub examined: usize,
    pub finalized: usize,
    pub in_flight: usize,
    pub errors: usize,
}

/// Recomputes job status from task status. Safe to call any number of times.
#[derive(Clone)]
pub struct Finalizer {
    store: Arc<dyn JobStore>,
}

impl Finalizer {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Errors are logged and counted, never returned: a failed read or write
    /// leaves the job for the next pass or the next explicit call.
    pub async fn finalize<I>(&self, job_ids: I) -> FinalizeSummary
    where
        I: IntoIterator<Item = Uuid>,
    {
        let job_ids: BTreeSet<Uuid> = job_ids.into_iter().collect();
        let mut summary = FinalizeSummary::default();

        for job_id in job_ids {
            summary.examined += 1;

            let statuses = match self.store.task_statuses(job_id).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(%job_id, error = %e, "finalize: could not read task statuses");
                    summary.errors += 1;
                    continue;
                }
            };

            let Some(status) = aggregate_status(&statuses) else {
                if !statuses.is_empty() {
                    summary.in_flight += 1;
                }
                continue;
            };

            match self.store.set_job_status(job_id, status).await {
                Ok(()) => {
                    tracing::info!(%job_id, %status, "job finalized");
                    summary.finalized += 1;
                }
                Err(e) => {
                    tracing::warn!(%job_id, error = %e, "finalize: could not write job status");
                    summary.errors += 1;
                }
            }
        }

        summary
    }
}
