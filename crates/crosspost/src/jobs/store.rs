//! Persistence seam for jobs and their delivery tasks.
//!
//! Every mutation is a single-row conditional update. The reconciler never
//! spans the job and task tables with one transaction; finalization reads
//! task rows and then writes the job row as two separate steps.

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::jobs::model::{Job, JobStatus, NewJob, Platform, Task, TaskStatus};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> anyhow::Result<()>;

    // ----------------------------
    // Intake + reads
    // ----------------------------

    /// Insert a `queued` job plus one `queued` task per distinct platform.
    async fn create_job(&self, job: NewJob, platforms: &[Platform]) -> anyhow::Result<Uuid>;

    async fn get_job(&self, job_id: Uuid) -> anyhow::Result<Option<Job>>;

    async fn jobs_by_ids(&self, job_ids: &[Uuid]) -> anyhow::Result<Vec<Job>>;

    async fn tasks_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<Task>>;

    // ----------------------------
    // Reconciliation
    // ----------------------------

    /// Up to `limit` tasks for `platform` that a claim could win: `queued`, or
    /// `processing` with a claim older than `lease` when a lease is given.
    /// Only tasks whose job is open (`queued`/`processing`) and due are returned.
    async fn claimable_tasks(
        &self,
        platform: Platform,
        lease: Option<Duration>,
        limit: i64,
    ) -> anyhow::Result<Vec<Task>>;

    /// Compare-and-swap into `processing`, clearing the last error.
    /// Returns a fresh claim token only for the single caller whose update hit
    /// the row; a reclaim after lease expiry replaces the previous token.
    async fn claim_task(&self, task_id: Uuid, lease: Option<Duration>)
        -> anyhow::Result<Option<Uuid>>;

    /// False when the task is no longer `processing` under `claim`.
    async fn mark_task_published(
        &self,
        task_id: Uuid,
        claim: Uuid,
        result_reference: &str,
    ) -> anyhow::Result<bool>;

    /// Record a failed attempt: status `failed`, message stored, attempts + 1.
    /// Same fencing as [`JobStore::mark_task_published`].
    async fn mark_task_failed(&self, task_id: Uuid, claim: Uuid, error: &str)
        -> anyhow::Result<bool>;

    async fn task_statuses(&self, job_id: Uuid) -> anyhow::Result<Vec<TaskStatus>>;

    /// Unconditional write of the aggregate status and publish timestamp.
    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> anyhow::Result<()>;

    // ----------------------------
    // Retry maintenance
    // ----------------------------

    async fn retryable_failed_tasks(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> anyhow::Result<Vec<Task>>;

    /// `failed -> queued` for one task; a finalized owning job is reopened as
    /// `processing` so the reconciler picks the task up again.
    async fn requeue_task(&self, task_id: Uuid) -> anyhow::Result<bool>;
}
