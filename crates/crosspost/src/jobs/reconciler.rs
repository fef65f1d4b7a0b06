//! One reconciliation pass: poll, claim, fetch, publish, record, finalize.
//!
//! Passes are safe to run repeatedly and concurrently. The claim is the only
//! exclusivity mechanism; everything after it touches a single task row.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::content::ContentFetcher;
use crate::credentials::{Credential, CredentialStore};
use crate::error::PassError;
use crate::jobs::claimer::TaskClaimer;
use crate::jobs::finalizer::Finalizer;
use crate::jobs::model::{Job, Platform, Task};
use crate::jobs::store::JobStore;
use crate::platforms::{AdapterRegistry, PlatformAdapter, PublishMetadata};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on tasks polled per pass.
    pub batch_size: i64,
    /// Tasks processed at once within a pass. 1 keeps the pass sequential.
    pub task_concurrency: usize,
    /// `processing` tasks claimed longer ago than this may be reclaimed.
    pub lease: Option<Duration>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            task_concurrency: 1,
            lease: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub tasks_found: usize,
    pub jobs_eligible: usize,
    pub tasks_eligible: usize,
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
    pub superseded: usize,
    pub jobs_finalized: usize,
}

impl PassStats {
    pub fn absorb(&mut self, other: &PassStats) {
        self.tasks_found += other.tasks_found;
        self.jobs_eligible += other.jobs_eligible;
        self.tasks_eligible += other.tasks_eligible;
        self.claimed += other.claimed;
        self.published += other.published;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.superseded += other.superseded;
        self.jobs_finalized += other.jobs_finalized;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub platform: Platform,
    /// Tasks published during this pass.
    pub published: usize,
    pub debug: PassStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Skipped,
    Published,
    Failed,
    /// Claimed, but a later pass reclaimed the task before the result landed.
    Superseded,
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn JobStore>,
    fetcher: ContentFetcher,
    adapters: Arc<AdapterRegistry>,
    credentials: Arc<dyn CredentialStore>,
    claimer: TaskClaimer,
    finalizer: Finalizer,
    cfg: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        fetcher: ContentFetcher,
        adapters: Arc<AdapterRegistry>,
        credentials: Arc<dyn CredentialStore>,
        cfg: ReconcilerConfig,
    ) -> Self {
        Self {
            claimer: TaskClaimer::new(store.clone(), cfg.lease),
            finalizer: Finalizer::new(store.clone()),
            store,
            fetcher,
            adapters,
            credentials,
            cfg,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn finalizer(&self) -> &Finalizer {
        &self.finalizer
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.platforms()
    }

    /// One pass per registered platform, in platform order.
    pub async fn run_all(&self) -> Vec<(Platform, Result<PassReport, PassError>)> {
        let mut results = Vec::new();
        for platform in self.adapters.platforms() {
            let result = self.run_pass(platform).await;
            if let Err(e) = &result {
                tracing::warn!(%platform, error = %e, "reconcile pass aborted");
            }
            results.push((platform, result));
        }
        results
    }

    pub async fn run_pass(&self, platform: Platform) -> Result<PassReport, PassError> {
        let adapter = self
            .adapters
            .adapter_for(platform)
            .ok_or(PassError::NoAdapter(platform))?;

        let mut stats = PassStats::default();

        // 1) bounded poll
        let tasks = self
            .store
            .claimable_tasks(platform, self.cfg.lease, self.cfg.batch_size)
            .await?;
        stats.tasks_found = tasks.len();

        // 2) keep tasks whose job is still open and due
        let job_ids: Vec<Uuid> = tasks
            .iter()
            .map(|t| t.job_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let now = Utc::now();
        let jobs: HashMap<Uuid, Job> = self
            .store
            .jobs_by_ids(&job_ids)
            .await?
            .into_iter()
            .filter(|j| j.is_due(now))
            .map(|j| (j.id, j))
            .collect();
        stats.jobs_eligible = jobs.len();

        let eligible: Vec<(Task, Job)> = tasks
            .into_iter()
            .filter_map(|t| jobs.get(&t.job_id).cloned().map(|j| (t, j)))
            .collect();
        stats.tasks_eligible = eligible.len();

        // 3) nothing due
        if eligible.is_empty() {
            tracing::debug!(
                %platform,
                tasks_found = stats.tasks_found,
                jobs_eligible = stats.jobs_eligible,
                "reconcile pass: nothing eligible"
            );
            return Ok(PassReport {
                platform,
                published: 0,
                debug: stats,
            });
        }

        // 4) credential once per pass; nothing has been mutated yet
        let credential = if adapter.requires_credential() {
            let credential = self
                .credentials
                .credential_for(platform)
                .await?
                .ok_or(PassError::MissingCredential(platform))?;
            Some(credential)
        } else {
            None
        };

        // 5) each task independently
        let semaphore = Arc::new(Semaphore::new(self.cfg.task_concurrency.max(1)));
        let mut set = JoinSet::new();

        for (task, job) in eligible {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            let this = self.clone();
            let adapter = adapter.clone();
            let credential = credential.clone();

            set.spawn(async move {
                let _permit = permit;
                let outcome = this
                    .process_task(&task, &job, adapter.as_ref(), credential.as_ref())
                    .await;
                (task.job_id, outcome)
            });
        }

        let mut touched = BTreeSet::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, TaskOutcome::Skipped)) => stats.skipped += 1,
                Ok((job_id, outcome)) => {
                    stats.claimed += 1;
                    match outcome {
                        TaskOutcome::Published => stats.published += 1,
                        TaskOutcome::Failed => stats.failed += 1,
                        _ => stats.superseded += 1,
                    }
                    touched.insert(job_id);
                }
                Err(e) => {
                    // the task row stays `processing` until a lease reclaims it
                    tracing::error!(%platform, error = %e, "task worker aborted");
                }
            }
        }

        // 6) roll up whatever this pass touched
        let summary = self.finalizer.finalize(touched).await;
        stats.jobs_finalized = summary.finalized;

        tracing::info!(
            %platform,
            tasks_found = stats.tasks_found,
            tasks_eligible = stats.tasks_eligible,
            claimed = stats.claimed,
            published = stats.published,
            failed = stats.failed,
            skipped = stats.skipped,
            superseded = stats.superseded,
            jobs_finalized = stats.jobs_finalized,
            "reconcile pass finished"
        );

        // 7)
        Ok(PassReport {
            platform,
            published: stats.published,
            debug: stats,
        })
    }

    async fn process_task(
        &self,
        task: &Task,
        job: &Job,
        adapter: &dyn PlatformAdapter,
        credential: Option<&Credential>,
    ) -> TaskOutcome {
        let Some(claim) = self.claimer.claim(task.id).await else {
            return TaskOutcome::Skipped;
        };

        let content = match self.fetcher.fetch(&job.content_reference).await {
            Ok(bytes) => bytes,
            Err(e) => return self.record_failure(task, claim, &e.to_string()).await,
        };

        let metadata = PublishMetadata::from_caption(job.caption.as_deref());

        match adapter.publish(credential, content, &metadata).await {
            Ok(result) => {
                match self
                    .store
                    .mark_task_published(task.id, claim, &result.external_url)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(
                            task_id = %task.id,
                            job_id = %task.job_id,
                            external_url = %result.external_url,
                            "published after claim was taken over, result discarded"
                        );
                        return TaskOutcome::Superseded;
                    }
                    Err(e) => {
                        tracing::error!(
                            task_id = %task.id,
                            job_id = %task.job_id,
                            external_url = %result.external_url,
                            error = %e,
                            "published but could not record result"
                        );
                    }
                }
                tracing::info!(
                    task_id = %task.id,
                    job_id = %task.job_id,
                    platform = %task.platform,
                    external_url = %result.external_url,
                    "task published"
                );
                TaskOutcome::Published
            }
            Err(e) => self.record_failure(task, claim, &e.message).await,
        }
    }

    async fn record_failure(&self, task: &Task, claim: Uuid, message: &str) -> TaskOutcome {
        tracing::warn!(
            task_id = %task.id,
            job_id = %task.job_id,
            platform = %task.platform,
            error = %message,
            "task failed"
        );

        match self.store.mark_task_failed(task.id, claim, message).await {
            Ok(true) => TaskOutcome::Failed,
            Ok(false) => {
                tracing::warn!(task_id = %task.id, "failure not recorded, claim was taken over");
                TaskOutcome::Superseded
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "could not record task failure");
                TaskOutcome::Failed
            }
        }
    }
}
