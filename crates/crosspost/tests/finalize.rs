mod common;

use common::{past, Harness};
use uuid::Uuid;

use crosspost::jobs::{Finalizer, JobStatus, JobStore, Platform};

async fn settle(h: &Harness, job_id: Uuid, platform: Platform, ok: bool) {
    let task = h.task_for(job_id, platform).await;
    let claim = h.store.claim_task(task.id, None).await.unwrap().unwrap();
    let written = if ok {
        h.store
            .mark_task_published(task.id, claim, "https://example/ok")
            .await
            .unwrap()
    } else {
        h.store.mark_task_failed(task.id, claim, "failed").await.unwrap()
    };
    assert!(written);
}

#[tokio::test]
async fn finalize_twice_yields_same_status() {
    let h = Harness::new();
    let job_id = h.due_post(&[Platform::Youtube, Platform::Tiktok]).await;
    settle(&h, job_id, Platform::Youtube, true).await;
    settle(&h, job_id, Platform::Tiktok, false).await;

    let finalizer = Finalizer::new(h.dyn_store());

    let first = finalizer.finalize([job_id]).await;
    assert_eq!(first.finalized, 1);
    assert_eq!(first.errors, 0);
    assert_eq!(h.job(job_id).await.status, JobStatus::Partial);

    let second = finalizer.finalize([job_id]).await;
    assert_eq!(second.finalized, 1);
    assert_eq!(second.errors, 0);
    assert_eq!(h.job(job_id).await.status, JobStatus::Partial);
}

#[tokio::test]
async fn all_published_and_all_failed() {
    let h = Harness::new();
    let good = h.due_post(&[Platform::Youtube, Platform::Instagram]).await;
    let bad = h.due_post(&[Platform::Youtube, Platform::Instagram]).await;

    for p in [Platform::Youtube, Platform::Instagram] {
        settle(&h, good, p, true).await;
        settle(&h, bad, p, false).await;
    }

    let summary = Finalizer::new(h.dyn_store()).finalize([good, bad]).await;
    assert_eq!(summary.finalized, 2);
    assert_eq!(h.job(good).await.status, JobStatus::Published);
    assert_eq!(h.job(bad).await.status, JobStatus::Failed);
}

#[tokio::test]
async fn in_flight_job_is_left_alone() {
    let h = Harness::new();
    let job_id = h.due_post(&[Platform::Youtube, Platform::Tiktok]).await;
    settle(&h, job_id, Platform::Youtube, true).await;

    let summary = Finalizer::new(h.dyn_store()).finalize([job_id]).await;
    assert_eq!(summary.in_flight, 1);
    assert_eq!(summary.finalized, 0);

    let job = h.job(job_id).await;
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.published_at.is_none());
}

#[tokio::test]
async fn job_without_tasks_is_not_finalized() {
    let h = Harness::new();
    let job_id = h.post("uploads/none.mp4", past(), &[]).await;
    assert!(h.store.tasks_for_job(job_id).await.unwrap().is_empty());

    let summary = Finalizer::new(h.dyn_store()).finalize([job_id]).await;
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.finalized, 0);
    assert_eq!(summary.in_flight, 0);
    assert_eq!(h.job(job_id).await.status, JobStatus::Queued);
}

#[tokio::test]
async fn duplicate_and_unknown_ids() {
    let h = Harness::new();
    let job_id = h.due_post(&[Platform::Youtube]).await;
    settle(&h, job_id, Platform::Youtube, true).await;

    let summary = Finalizer::new(h.dyn_store())
        .finalize([job_id, job_id, Uuid::new_v4()])
        .await;
    assert_eq!(summary.examined, 2);
    assert_eq!(summary.finalized, 1);
    assert_eq!(summary.errors, 0);
}
