//! In-memory [`JobStore`] for tests, demos and single-process development.
//!
//! Claims hold the same exclusivity guarantee as the Postgres store because
//! every conditional update runs under one mutex.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::jobs::model::{Job, JobStatus, NewJob, Platform, Task, TaskStatus};
use crate::jobs::store::JobStore;

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    tasks: HashMap<Uuid, Task>,
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    state: Mutex<State>,
}

fn poison_err<T>(_: PoisonError<T>) -> anyhow::Error {
    anyhow::anyhow!("memory job store lock poisoned")
}

fn claimable(task: &Task, lease: Option<Duration>, now: DateTime<Utc>) -> bool {
    match task.status {
        TaskStatus::Queued => true,
        TaskStatus::Processing => match (lease.filter(|l| *l > Duration::zero()), task.claimed_at) {
            (Some(lease), Some(claimed_at)) => claimed_at < now - lease,
            _ => false,
        },
        _ => false,
    }
}

fn holds(task: &Task, claim: Uuid) -> bool {
    task.status == TaskStatus::Processing && task.claim_token == Some(claim)
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(poison_err)
    }

    pub fn task(&self, task_id: Uuid) -> anyhow::Result<Option<Task>> {
        Ok(self.lock()?.tasks.get(&task_id).cloned())
    }

    /// Shift a task's claim timestamp into the past, as if its worker died mid-attempt.
    pub fn backdate_claim(&self, task_id: Uuid, by: Duration) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| anyhow::anyhow!("unknown task {task_id}"))?;
        task.claimed_at = task.claimed_at.map(|at| at - by);
        Ok(())
    }

    /// Shift a task's last update into the past so retry backoff has elapsed.
    pub fn backdate_update(&self, task_id: Uuid, by: Duration) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| anyhow::anyhow!("unknown task {task_id}"))?;
        task.updated_at -= by;
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn ping(&self) -> anyhow::Result<()> {
        self.lock().map(|_| ())
    }

    async fn create_job(&self, job: NewJob, platforms: &[Platform]) -> anyhow::Result<Uuid> {
        let now = Utc::now();
        let job_id = Uuid::new_v4();
        let mut state = self.lock()?;

        state.jobs.insert(
            job_id,
            Job {
                id: job_id,
                content_reference: job.content_reference,
                caption: job.caption,
                scheduled_at: job.scheduled_at,
                status: JobStatus::Queued,
                published_at: None,
                created_at: now,
                updated_at: now,
            },
        );

        let mut seen = Vec::with_capacity(platforms.len());
        for platform in platforms {
            if seen.contains(platform) {
                continue;
            }
            seen.push(*platform);

            let task_id = Uuid::new_v4();
            state.tasks.insert(
                task_id,
                Task {
                    id: task_id,
                    job_id,
                    platform: *platform,
                    status: TaskStatus::Queued,
                    attempts: 0,
                    result_reference: None,
                    error: None,
                    published_at: None,
                    claimed_at: None,
                    claim_token: None,
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        Ok(job_id)
    }

    async fn get_job(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        Ok(self.lock()?.jobs.get(&job_id).cloned())
    }

    async fn jobs_by_ids(&self, job_ids: &[Uuid]) -> anyhow::Result<Vec<Job>> {
        let state = self.lock()?;
        Ok(job_ids
            .iter()
            .filter_map(|id| state.jobs.get(id).cloned())
            .collect())
    }

    async fn tasks_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<Task>> {
        let state = self.lock()?;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.platform.as_str());
        Ok(tasks)
    }

    async fn claimable_tasks(
        &self,
        platform: Platform,
        lease: Option<Duration>,
        limit: i64,
    ) -> anyhow::Result<Vec<Task>> {
        let now = Utc::now();
        let state = self.lock()?;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.platform == platform)
            .filter(|t| state.jobs.get(&t.job_id).is_some_and(|j| j.is_due(now)))
            .filter(|t| claimable(t, lease, now))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks.truncate(limit.max(1) as usize);
        Ok(tasks)
    }

    async fn claim_task(
        &self,
        task_id: Uuid,
        lease: Option<Duration>,
    ) -> anyhow::Result<Option<Uuid>> {
        let now = Utc::now();
        let mut state = self.lock()?;
        let Some(task) = state.tasks.get_mut(&task_id) else {
            return Ok(None);
        };
        if !claimable(task, lease, now) {
            return Ok(None);
        }

        let token = Uuid::new_v4();
        task.status = TaskStatus::Processing;
        task.error = None;
        task.claimed_at = Some(now);
        task.claim_token = Some(token);
        task.updated_at = now;
        Ok(Some(token))
    }

    async fn mark_task_published(
        &self,
        task_id: Uuid,
        claim: Uuid,
        result_reference: &str,
    ) -> anyhow::Result<bool> {
        let now = Utc::now();
        let mut state = self.lock()?;
        let Some(task) = state.tasks.get_mut(&task_id).filter(|t| holds(t, claim)) else {
            return Ok(false);
        };

        task.status = TaskStatus::Published;
        task.result_reference = Some(result_reference.to_string());
        task.error = None;
        task.published_at = Some(now);
        task.updated_at = now;
        Ok(true)
    }

    async fn mark_task_failed(
        &self,
        task_id: Uuid,
        claim: Uuid,
        error: &str,
    ) -> anyhow::Result<bool> {
        let now = Utc::now();
        let mut state = self.lock()?;
        let Some(task) = state.tasks.get_mut(&task_id).filter(|t| holds(t, claim)) else {
            return Ok(false);
        };

        task.status = TaskStatus::Failed;
        task.error = Some(error.to_string());
        task.attempts += 1;
        task.updated_at = now;
        Ok(true)
    }

    async fn task_statuses(&self, job_id: Uuid) -> anyhow::Result<Vec<TaskStatus>> {
        let state = self.lock()?;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.job_id == job_id)
            .map(|t| t.status)
            .collect())
    }

    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut state = self.lock()?;
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.status = status;
            job.published_at = Some(now);
            job.updated_at = now;
        }
        Ok(())
    }

    async fn retryable_failed_tasks(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> anyhow::Result<Vec<Task>> {
        let state = self.lock()?;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Failed && t.attempts < max_attempts)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.updated_at);
        tasks.truncate(limit.max(1) as usize);
        Ok(tasks)
    }

    async fn requeue_task(&self, task_id: Uuid) -> anyhow::Result<bool> {
        let now = Utc::now();
        let mut state = self.lock()?;

        let job_id = match state.tasks.get_mut(&task_id) {
            Some(task) if task.status == TaskStatus::Failed => {
                task.status = TaskStatus::Queued;
                task.claimed_at = None;
                task.claim_token = None;
                task.updated_at = now;
                task.job_id
            }
            _ => return Ok(false),
        };

        if let Some(job) = state.jobs.get_mut(&job_id) {
            if job.status.is_finalized() {
                job.status = JobStatus::Processing;
                job.published_at = None;
                job.updated_at = now;
            }
        }
        Ok(true)
    }
}
