#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crosspost::content::{ContentFetcher, MemoryObjectStore};
use crosspost::credentials::{Credential, StaticCredentials};
use crosspost::error::PublishError;
use crosspost::jobs::{
    Job, JobStore, MemoryJobStore, NewJob, Platform, Reconciler, ReconcilerConfig, Task,
};
use crosspost::platforms::{AdapterRegistry, PlatformAdapter, PublishMetadata, PublishResult};

pub const BUCKET: &str = "videos";

/// Connects to `TEST_DATABASE_URL`, migrates and truncates.
/// Returns `None` (test skips) when no test database is configured.
pub async fn setup_db() -> Option<PgPool> {
    let _ = dotenvy::dotenv();

    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL unset; skipping postgres test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("failed to connect to TEST_DATABASE_URL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");

    sqlx::query("TRUNCATE TABLE job_tasks, jobs, platform_tokens CASCADE")
        .execute(&pool)
        .await
        .expect("truncate failed");

    Some(pool)
}

pub fn past() -> DateTime<Utc> {
    Utc::now() - ChronoDuration::minutes(5)
}

pub fn future() -> DateTime<Utc> {
    Utc::now() + ChronoDuration::hours(1)
}

enum Script {
    Succeed(String),
    Fail(String),
    FailNumbered(String),
}

/// Adapter with a fixed answer that counts its calls.
pub struct ScriptedAdapter {
    platform: Platform,
    script: Script,
    needs_credential: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    fn new(platform: Platform, script: Script) -> Self {
        Self {
            platform,
            script,
            needs_credential: true,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(platform: Platform, url: &str) -> Self {
        Self::new(platform, Script::Succeed(url.to_string()))
    }

    pub fn failing(platform: Platform, message: &str) -> Self {
        Self::new(platform, Script::Fail(message.to_string()))
    }

    /// Fails with `"<message> #<call number>"`.
    pub fn failing_numbered(platform: Platform, message: &str) -> Self {
        Self::new(platform, Script::FailNumbered(message.to_string()))
    }

    pub fn without_credential(mut self) -> Self {
        self.needs_credential = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn requires_credential(&self) -> bool {
        self.needs_credential
    }

    async fn publish(
        &self,
        credential: Option<&Credential>,
        _content: Vec<u8>,
        _metadata: &PublishMetadata,
    ) -> Result<PublishResult, PublishError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.needs_credential && credential.is_none() {
            return Err(PublishError::new("adapter called without credential"));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.script {
            Script::Succeed(url) => Ok(PublishResult {
                external_url: url.clone(),
            }),
            Script::Fail(msg) => Err(PublishError::new(msg.clone())),
            Script::FailNumbered(msg) => Err(PublishError::new(format!("{msg} #{n}"))),
        }
    }
}

/// In-memory store, object store and credentials wired for reconciler tests.
pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub credentials: Arc<StaticCredentials>,
}

impl Harness {
    pub fn new() -> Self {
        let credentials = StaticCredentials::new()
            .with(Platform::Youtube, "yt-refresh")
            .with(Platform::Instagram, "ig-refresh")
            .with(Platform::Tiktok, "tt-refresh");
        Self::with_credentials(credentials)
    }

    pub fn without_credentials() -> Self {
        Self::with_credentials(StaticCredentials::new())
    }

    fn with_credentials(credentials: StaticCredentials) -> Self {
        Self {
            store: Arc::new(MemoryJobStore::new()),
            objects: Arc::new(MemoryObjectStore::new()),
            credentials: Arc::new(credentials),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    pub fn fetcher(&self) -> ContentFetcher {
        ContentFetcher::new(self.objects.clone(), BUCKET)
    }

    pub fn reconciler(&self, registry: AdapterRegistry, cfg: ReconcilerConfig) -> Reconciler {
        Reconciler::new(
            self.dyn_store(),
            self.fetcher(),
            Arc::new(registry),
            self.credentials.clone(),
            cfg,
        )
    }

    /// Job pointing at a stored object, due five minutes ago.
    pub async fn due_post(&self, platforms: &[Platform]) -> Uuid {
        let key = format!("uploads/{}.mp4", Uuid::new_v4());
        self.objects.put(key.clone(), b"fake mp4 bytes".to_vec());
        self.post(&key, past(), platforms).await
    }

    pub async fn post(
        &self,
        reference: &str,
        scheduled_at: DateTime<Utc>,
        platforms: &[Platform],
    ) -> Uuid {
        self.store
            .create_job(
                NewJob {
                    content_reference: reference.to_string(),
                    caption: Some("Launch day\nwith details".to_string()),
                    scheduled_at,
                },
                platforms,
            )
            .await
            .expect("create_job")
    }

    pub async fn job(&self, job_id: Uuid) -> Job {
        self.store
            .get_job(job_id)
            .await
            .expect("get_job")
            .expect("job exists")
    }

    pub async fn task_for(&self, job_id: Uuid, platform: Platform) -> Task {
        self.store
            .tasks_for_job(job_id)
            .await
            .expect("tasks_for_job")
            .into_iter()
            .find(|t| t.platform == platform)
            .expect("task for platform")
    }
}
