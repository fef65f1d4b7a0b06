use std::sync::Arc;
use std::time::Duration;

use crosspost::api;
use crosspost::config;
use crosspost::content::ContentFetcher;
use crosspost::credentials::{CredentialStore, TokensRepo};
use crosspost::db;
use crosspost::jobs::{JobStore, JobsRepo, Maintenance, Reconciler};
use crosspost::platforms::YoutubeOAuth;
use crosspost::telemetry;

mod adapters;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let cfg = config::Config::from_env()?;

    let api_addr = cfg.api_addr.clone();
    let retry = cfg.retry();

    tracing::info!(
        worker_id = %cfg.worker_id,
        api = %api_addr.as_deref().unwrap_or("disabled"),
        trigger_auth = if cfg.worker_secret.is_some() { "enabled" } else { "refusing all" },
        batch_size = cfg.batch_size,
        task_concurrency = cfg.task_concurrency,
        lease_seconds = cfg.lease_seconds,
        poll_interval_secs = cfg.poll_interval_secs,
        max_task_attempts = cfg.max_task_attempts,
        migrate_on_startup = cfg.migrate_on_startup,
        "crosspost worker starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let store: Arc<dyn JobStore> = Arc::new(JobsRepo::new(pool.clone()));
    let credentials: Arc<dyn CredentialStore> = Arc::new(TokensRepo::new(pool.clone()));

    let http = reqwest::Client::new();
    let registry = adapters::build_registry(&cfg, &http);
    if registry.is_empty() {
        tracing::warn!("no platform adapters registered; passes will do nothing");
    }
    let fetcher = ContentFetcher::new(
        adapters::build_object_store(&cfg, &http)?,
        cfg.storage.bucket.clone(),
    );

    let reconciler = Reconciler::new(
        store.clone(),
        fetcher,
        Arc::new(registry),
        credentials.clone(),
        cfg.reconciler(),
    );

    // ---- API task ----
    let api_state = api::ApiState {
        store: store.clone(),
        reconciler: reconciler.clone(),
        gate: api::SharedSecretGate::new(cfg.worker_secret.clone()),
        credentials: credentials.clone(),
        default_platforms: cfg.platforms.clone(),
        youtube: cfg
            .youtube
            .clone()
            .map(|yt| YoutubeOAuth::new(http.clone(), yt)),
    };
    let app = api::router(api_state);

    let api_handle = tokio::spawn(async move {
        if let Some(addr) = api_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("api listening on http://{addr}");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    // ---- Poll task ----
    let poll_interval_secs = cfg.poll_interval_secs;
    let poll_handle = tokio::spawn(async move {
        if poll_interval_secs == 0 {
            // trigger-only
            std::future::pending::<()>().await;
        }

        loop {
            for (platform, result) in reconciler.run_all().await {
                if let Ok(report) = result {
                    if report.published > 0 {
                        tracing::info!(%platform, published = report.published, "poll pass");
                    }
                }
            }
            tokio::time::sleep(Duration::from_secs(poll_interval_secs)).await;
        }
        #[allow(unreachable_code)]
        Ok::<(), anyhow::Error>(())
    });

    // ---- Retry maintenance task ----
    let maintenance_interval = Duration::from_secs(cfg.maintenance_interval_secs);
    let maintenance = Maintenance::new(store.clone(), retry, cfg.batch_size);
    let maintenance_handle = tokio::spawn(async move {
        if !maintenance.retry().enabled() {
            std::future::pending::<()>().await;
        }

        loop {
            match maintenance.requeue_failed().await {
                Ok(summary) if summary.requeued > 0 => {
                    tracing::info!(
                        requeued = summary.requeued,
                        waiting = summary.waiting,
                        "retry maintenance"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "retry maintenance failed"),
            }
            tokio::time::sleep(maintenance_interval).await;
        }
        #[allow(unreachable_code)]
        Ok::<(), anyhow::Error>(())
    });

    tokio::select! {
        res = api_handle => res??,
        res = poll_handle => res??,
        res = maintenance_handle => res??,
    }

    Ok(())
}
