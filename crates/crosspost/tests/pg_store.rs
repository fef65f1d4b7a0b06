mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{setup_db, ScriptedAdapter};
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

use crosspost::content::{ContentFetcher, MemoryObjectStore};
use crosspost::credentials::{CredentialStore, TokensRepo};
use crosspost::jobs::{
    Finalizer, JobStatus, JobStore, JobsRepo, NewJob, Platform, Reconciler, ReconcilerConfig,
    TaskStatus,
};
use crosspost::platforms::AdapterRegistry;

async fn insert_post(repo: &JobsRepo, reference: &str, offset_secs: i64, platforms: &[Platform]) -> Uuid {
    repo.create_job(
        NewJob {
            content_reference: reference.to_string(),
            caption: Some("pg test".into()),
            scheduled_at: Utc::now() + Duration::seconds(offset_secs),
        },
        platforms,
    )
    .await
    .expect("create_job")
}

async fn task_id(repo: &JobsRepo, job_id: Uuid, platform: Platform) -> Uuid {
    repo.tasks_for_job(job_id)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.platform == platform)
        .expect("task")
        .id
}

async fn backdate_claim(pool: &PgPool, task_id: Uuid, secs: i64) {
    sqlx::query(
        "UPDATE job_tasks SET claimed_at = claimed_at - ($2::bigint * interval '1 second') WHERE id = $1",
    )
    .bind(task_id)
    .bind(secs)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
#[serial]
async fn create_job_fans_out_one_task_per_distinct_platform() {
    let Some(pool) = setup_db().await else { return };
    let repo = JobsRepo::new(pool);

    let job_id = insert_post(
        &repo,
        "uploads/a.mp4",
        -60,
        &[Platform::Youtube, Platform::Tiktok, Platform::Youtube],
    )
    .await;

    let job = repo.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    let tasks = repo.tasks_for_job(job_id).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Queued && t.attempts == 0));
}

#[tokio::test]
#[serial]
async fn concurrent_claims_on_one_row_only_one_wins() {
    let Some(pool) = setup_db().await else { return };
    let repo = JobsRepo::new(pool);

    let job_id = insert_post(&repo, "uploads/a.mp4", -60, &[Platform::Youtube]).await;
    let id = task_id(&repo, job_id, Platform::Youtube).await;

    let repo_a = repo.clone();
    let repo_b = repo.clone();
    let (a, b) = tokio::join!(
        async move { repo_a.claim_task(id, None).await.unwrap() },
        async move { repo_b.claim_task(id, None).await.unwrap() },
    );
    assert!(
        a.is_some() ^ b.is_some(),
        "exactly one claim must win (a={a:?}, b={b:?})"
    );
}

#[tokio::test]
#[serial]
async fn lease_controls_reclaim_of_processing_tasks() {
    let Some(pool) = setup_db().await else { return };
    let repo = JobsRepo::new(pool.clone());

    let job_id = insert_post(&repo, "uploads/a.mp4", -60, &[Platform::Youtube]).await;
    let id = task_id(&repo, job_id, Platform::Youtube).await;
    let lease = Some(Duration::seconds(30));

    assert!(repo.claim_task(id, None).await.unwrap().is_some());
    assert!(repo.claim_task(id, lease).await.unwrap().is_none());
    assert!(repo
        .claimable_tasks(Platform::Youtube, lease, 10)
        .await
        .unwrap()
        .is_empty());

    backdate_claim(&pool, id, 120).await;
    assert!(repo.claim_task(id, None).await.unwrap().is_none());
    assert_eq!(
        repo.claimable_tasks(Platform::Youtube, lease, 10)
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(repo.claim_task(id, lease).await.unwrap().is_some());
}

#[tokio::test]
#[serial]
async fn stale_claim_token_cannot_write_after_reclaim() {
    let Some(pool) = setup_db().await else { return };
    let repo = JobsRepo::new(pool.clone());

    let job_id = insert_post(&repo, "uploads/a.mp4", -60, &[Platform::Youtube]).await;
    let id = task_id(&repo, job_id, Platform::Youtube).await;
    let lease = Some(Duration::seconds(60));

    let stale = repo.claim_task(id, lease).await.unwrap().unwrap();
    backdate_claim(&pool, id, 300).await;
    let fresh = repo.claim_task(id, lease).await.unwrap().unwrap();

    assert!(!repo.mark_task_failed(id, stale, "timed out").await.unwrap());
    assert!(repo.mark_task_published(id, fresh, "https://yt/fresh").await.unwrap());

    let task = repo
        .tasks_for_job(job_id)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.id == id)
        .unwrap();
    assert_eq!(task.status, TaskStatus::Published);
    assert_eq!(task.attempts, 0);
    assert_eq!(task.result_reference.as_deref(), Some("https://yt/fresh"));
}

#[tokio::test]
#[serial]
async fn poll_skips_future_and_finalized_jobs() {
    let Some(pool) = setup_db().await else { return };
    let repo = JobsRepo::new(pool);

    for _ in 0..5 {
        insert_post(&repo, "uploads/later.mp4", 3600, &[Platform::Youtube]).await;
    }
    let due = insert_post(&repo, "uploads/now.mp4", -60, &[Platform::Youtube]).await;

    let polled = repo.claimable_tasks(Platform::Youtube, None, 5).await.unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].job_id, due);

    repo.set_job_status(due, JobStatus::Failed).await.unwrap();
    assert!(repo
        .claimable_tasks(Platform::Youtube, None, 5)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[serial]
async fn failed_task_requeue_reopens_finalized_job() {
    let Some(pool) = setup_db().await else { return };
    let repo = JobsRepo::new(pool);

    let job_id = insert_post(&repo, "uploads/a.mp4", -60, &[Platform::Tiktok]).await;
    let id = task_id(&repo, job_id, Platform::Tiktok).await;

    let claim = repo.claim_task(id, None).await.unwrap().unwrap();
    assert!(repo.mark_task_failed(id, claim, "first").await.unwrap());
    // second write is ignored: task is no longer processing
    assert!(!repo.mark_task_failed(id, claim, "second").await.unwrap());

    let summary = Finalizer::new(Arc::new(repo.clone())).finalize([job_id]).await;
    assert_eq!(summary.finalized, 1);
    assert_eq!(repo.get_job(job_id).await.unwrap().unwrap().status, JobStatus::Failed);

    let retryable = repo.retryable_failed_tasks(3, 10).await.unwrap();
    assert_eq!(retryable.len(), 1);
    assert_eq!(retryable[0].attempts, 1);
    assert_eq!(retryable[0].error.as_deref(), Some("first"));

    assert!(repo.requeue_task(id).await.unwrap());
    assert!(!repo.requeue_task(id).await.unwrap());

    let job = repo.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert!(job.published_at.is_none());
}

#[tokio::test]
#[serial]
async fn reconcile_pass_over_postgres() {
    let Some(pool) = setup_db().await else { return };
    let repo = JobsRepo::new(pool.clone());

    let tokens = TokensRepo::new(pool.clone());
    tokens.save_refresh_token(Platform::Youtube, "yt").await.unwrap();
    tokens.save_refresh_token(Platform::Tiktok, "tt").await.unwrap();
    assert_eq!(
        tokens
            .credential_for(Platform::Youtube)
            .await
            .unwrap()
            .map(|c| c.expose().to_string()),
        Some("yt".to_string())
    );

    let objects = Arc::new(MemoryObjectStore::new());
    objects.put("uploads/a.mp4", b"bytes".to_vec());

    let due = insert_post(&repo, "uploads/a.mp4", -60, &[Platform::Youtube, Platform::Tiktok]).await;
    let later = insert_post(&repo, "uploads/a.mp4", 3600, &[Platform::Youtube]).await;

    let reconciler = Reconciler::new(
        Arc::new(repo.clone()),
        ContentFetcher::new(objects, "videos"),
        Arc::new(
            AdapterRegistry::new()
                .with(Arc::new(ScriptedAdapter::succeeding(
                    Platform::Youtube,
                    "https://platform/a/123",
                )))
                .with(Arc::new(ScriptedAdapter::failing(Platform::Tiktok, "network error"))),
        ),
        Arc::new(tokens),
        ReconcilerConfig::default(),
    );

    let results = reconciler.run_all().await;
    let published: usize = results
        .iter()
        .map(|(_, r)| r.as_ref().map(|r| r.published).unwrap_or(0))
        .sum();
    assert_eq!(published, 1);

    let tasks = repo.tasks_for_job(due).await.unwrap();
    let yt = tasks.iter().find(|t| t.platform == Platform::Youtube).unwrap();
    let tt = tasks.iter().find(|t| t.platform == Platform::Tiktok).unwrap();
    assert_eq!(yt.status, TaskStatus::Published);
    assert_eq!(yt.result_reference.as_deref(), Some("https://platform/a/123"));
    assert_eq!(tt.status, TaskStatus::Failed);
    assert_eq!(tt.attempts, 1);

    assert_eq!(repo.get_job(due).await.unwrap().unwrap().status, JobStatus::Partial);
    assert_eq!(repo.get_job(later).await.unwrap().unwrap().status, JobStatus::Queued);
}

#[tokio::test]
#[serial]
async fn platform_tokens_hold_only_the_refresh_token() {
    let Some(pool) = setup_db().await else { return };

    let columns: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT column_name::text
        FROM information_schema.columns
        WHERE table_name = 'platform_tokens'
        ORDER BY column_name
        "#,
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(columns, vec!["platform", "refresh_token", "updated_at"]);

    let tokens = TokensRepo::new(pool);
    tokens.save_refresh_token(Platform::Youtube, "one").await.unwrap();
    tokens.save_refresh_token(Platform::Youtube, "two").await.unwrap();
    let got = tokens.credential_for(Platform::Youtube).await.unwrap().unwrap();
    assert_eq!(got.expose(), "two");
}
