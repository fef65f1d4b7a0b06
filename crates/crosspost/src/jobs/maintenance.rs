use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::jobs::retry::{backoff_elapsed, RetryConfig};
use crate::jobs::store::JobStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequeueSummary {
    pub candidates: usize,
    pub requeued: usize,
    pub waiting: usize,
}

/// Moves failed tasks with attempts left back to `queued` once their backoff
/// has elapsed. The claim protocol is untouched; a requeued task is simply
/// `queued` again.
#[derive(Clone)]
pub struct Maintenance {
    store: Arc<dyn JobStore>,
    retry: RetryConfig,
    batch: i64,
}

impl Maintenance {
    pub fn new(store: Arc<dyn JobStore>, retry: RetryConfig, batch: i64) -> Self {
        Self {
            store,
            retry,
            batch,
        }
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub async fn requeue_failed(&self) -> anyhow::Result<RequeueSummary> {
        let mut summary = RequeueSummary::default();
        if !self.retry.enabled() {
            return Ok(summary);
        }

        let candidates = self
            .store
            .retryable_failed_tasks(self.retry.max_attempts, self.batch)
            .await?;
        summary.candidates = candidates.len();

        let now = Utc::now();
        let due: Vec<_> = candidates
            .into_iter()
            .filter(|t| backoff_elapsed(t.id, t.attempts, t.updated_at, now, &self.retry))
            .collect();
        summary.waiting = summary.candidates - due.len();

        for task in due {
            if self.store.requeue_task(task.id).await? {
                tracing::info!(
                    task_id = %task.id,
                    job_id = %task.job_id,
                    platform = %task.platform,
                    attempts = task.attempts,
                    "task requeued for retry"
                );
                summary.requeued += 1;
            }
        }

        Ok(summary)
    }
}
