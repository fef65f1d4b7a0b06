// crates/crosspost/src/jobs/repo.rs

use async_trait::async_trait;
use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use crate::jobs::model::{Job, JobStatus, NewJob, Platform, Task, TaskStatus};
use crate::jobs::store::JobStore;

#[derive(Clone)]
pub struct JobsRepo {
    pool: PgPool,
}

impl JobsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn lease_seconds(lease: Option<Duration>) -> Option<i64> {
    lease.map(|l| l.num_seconds()).filter(|s| *s > 0)
}

#[async_trait]
impl JobStore for JobsRepo {
    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ----------------------------
    // Intake + reads
    // ----------------------------

    async fn create_job(&self, job: NewJob, platforms: &[Platform]) -> anyhow::Result<Uuid> {
        let mut tx = self.pool.begin().await?;

        let job_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (content_reference, caption, scheduled_at, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&job.content_reference)
        .bind(&job.caption)
        .bind(job.scheduled_at)
        .bind(JobStatus::Queued.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let mut seen = Vec::with_capacity(platforms.len());
        for platform in platforms {
            if seen.contains(platform) {
                continue;
            }
            seen.push(*platform);

            sqlx::query(
                r#"
                INSERT INTO job_tasks (job_id, platform, status, attempts)
                VALUES ($1, $2, $3, 0)
                "#,
            )
            .bind(job_id)
            .bind(platform.as_str())
            .bind(TaskStatus::Queued.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(job_id)
    }

    async fn get_job(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn jobs_by_ids(&self, job_ids: &[Uuid]) -> anyhow::Result<Vec<Job>> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }

        let jobs = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ANY($1)")
            .bind(job_ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(jobs)
    }

    async fn tasks_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT *
            FROM job_tasks
            WHERE job_id = $1
            ORDER BY platform ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    // ----------------------------
    // Reconciliation
    // ----------------------------

    async fn claimable_tasks(
        &self,
        platform: Platform,
        lease: Option<Duration>,
        limit: i64,
    ) -> anyhow::Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT t.*
            FROM job_tasks t
            JOIN jobs j ON j.id = t.job_id
            WHERE t.platform = $1
              AND j.status IN ('queued', 'processing')
              AND j.scheduled_at <= now()
              AND (
                    t.status = 'queued'
                 OR (t.status = 'processing'
                     AND $2::bigint IS NOT NULL
                     AND t.claimed_at < now() - ($2::bigint * interval '1 second'))
              )
            ORDER BY t.created_at ASC, t.id ASC
            LIMIT $3
            "#,
        )
        .bind(platform.as_str())
        .bind(lease_seconds(lease))
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    // Under READ COMMITTED a concurrent second UPDATE re-evaluates the WHERE
    // clause against the committed row, so only one caller gets a token back.
    async fn claim_task(
        &self,
        task_id: Uuid,
        lease: Option<Duration>,
    ) -> anyhow::Result<Option<Uuid>> {
        let token = Uuid::new_v4();
        let res = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'processing',
                error = NULL,
                claimed_at = now(),
                claim_token = $3,
                updated_at = now()
            WHERE id = $1
              AND (
                    status = 'queued'
                 OR (status = 'processing'
                     AND $2::bigint IS NOT NULL
                     AND claimed_at < now() - ($2::bigint * interval '1 second'))
              )
            "#,
        )
        .bind(task_id)
        .bind(lease_seconds(lease))
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok((res.rows_affected() == 1).then_some(token))
    }

    async fn mark_task_published(
        &self,
        task_id: Uuid,
        claim: Uuid,
        result_reference: &str,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'published',
                result_reference = $3,
                error = NULL,
                published_at = now(),
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
              AND claim_token = $2
            "#,
        )
        .bind(task_id)
        .bind(claim)
        .bind(result_reference)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn mark_task_failed(
        &self,
        task_id: Uuid,
        claim: Uuid,
        error: &str,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'failed',
                error = $3,
                attempts = attempts + 1,
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
              AND claim_token = $2
            "#,
        )
        .bind(task_id)
        .bind(claim)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn task_statuses(&self, job_id: Uuid) -> anyhow::Result<Vec<TaskStatus>> {
        let raw: Vec<String> = sqlx::query_scalar("SELECT status FROM job_tasks WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;

        let statuses = raw
            .iter()
            .map(|s| s.parse::<TaskStatus>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(statuses)
    }

    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                published_at = now(),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ----------------------------
    // Retry maintenance
    // ----------------------------

    async fn retryable_failed_tasks(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> anyhow::Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT *
            FROM job_tasks
            WHERE status = 'failed'
              AND attempts < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(max_attempts)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn requeue_task(&self, task_id: Uuid) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let job_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE job_tasks
            SET status = 'queued',
                claimed_at = NULL,
                claim_token = NULL,
                updated_at = now()
            WHERE id = $1
              AND status = 'failed'
            RETURNING job_id
            "#,
        )
        .bind(task_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job_id) = job_id else {
            tx.commit().await?;
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing',
                published_at = NULL,
                updated_at = now()
            WHERE id = $1
              AND status IN ('published', 'failed', 'partial')
            "#,
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
