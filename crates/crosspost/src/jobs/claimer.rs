use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::jobs::store::JobStore;

/// Wins a task for exactly one pass.
///
/// A lost race, a vanished row and a store error all read as "not claimed":
/// the caller skips the task and a later pass gets another chance.
#[derive(Clone)]
pub struct TaskClaimer {
    store: Arc<dyn JobStore>,
    lease: Option<Duration>,
}

impl TaskClaimer {
    pub fn new(store: Arc<dyn JobStore>, lease: Option<Duration>) -> Self {
        Self { store, lease }
    }

    pub fn lease(&self) -> Option<Duration> {
        self.lease
    }

    /// The claim token on success; result writes for the task must carry it.
    pub async fn claim(&self, task_id: Uuid) -> Option<Uuid> {
        match self.store.claim_task(task_id, self.lease).await {
            Ok(Some(token)) => Some(token),
            Ok(None) => {
                tracing::debug!(%task_id, "claim lost, task already taken");
                None
            }
            Err(e) => {
                tracing::warn!(%task_id, error = %e, "claim failed, skipping task");
                None
            }
        }
    }
}
