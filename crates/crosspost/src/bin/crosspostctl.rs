use std::env;
use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crosspost::config::Config;
use crosspost::credentials::{CredentialStore, TokensRepo};
use crosspost::db;
use crosspost::jobs::{Finalizer, JobStore, JobsRepo, Maintenance, NewJob, Platform};

const USAGE: &str = "crosspostctl <command>\n\
    Commands:\n\
    - migrate\n\
    - reset\n\
    - seed <n> [delay_secs]\n\
    - show <job_id>\n\
    - finalize <job_id>\n\
    - requeue\n\
    - set-token <platform> <refresh_token>\n\
    \n\
    Uses DATABASE_URL (or TEST_DATABASE_URL).\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let Some(command) = args.get(1) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    dotenvy::dotenv().ok();
    let cfg = Config::from_lookup(|key| {
        env::var(key).ok().or_else(|| {
            (key == "DATABASE_URL")
                .then(|| env::var("TEST_DATABASE_URL").ok())
                .flatten()
        })
    })?;

    let pool = db::make_pool(&cfg.database_url).await?;
    let repo = JobsRepo::new(pool.clone());

    match command.as_str() {
        "migrate" => {
            db::run_migrations(&pool).await?;
            println!("migrate OK");
        }
        "reset" => reset(&pool).await?,
        "seed" => {
            let n: i64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(5);
            let delay: i64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0);
            seed(&repo, &cfg.platforms, n, delay).await?;
        }
        "show" => {
            let job_id = job_id_arg(&args, "show")?;
            show(&repo, job_id).await?;
        }
        "finalize" => {
            let job_id = job_id_arg(&args, "finalize")?;
            let finalizer = Finalizer::new(Arc::new(repo.clone()));
            let summary = finalizer.finalize([job_id]).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        "requeue" => {
            let retry = cfg.retry();
            if !retry.enabled() {
                println!("retry disabled (MAX_TASK_ATTEMPTS={})", retry.max_attempts);
                return Ok(());
            }
            let maintenance = Maintenance::new(Arc::new(repo.clone()), retry, cfg.batch_size);
            let summary = maintenance.requeue_failed().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        "set-token" => {
            let (Some(platform), Some(token)) = (args.get(2), args.get(3)) else {
                anyhow::bail!("usage: crosspostctl set-token <platform> <refresh_token>");
            };
            let platform: Platform = platform.parse()?;
            TokensRepo::new(pool.clone())
                .save_refresh_token(platform, token)
                .await?;
            println!("token stored for {platform}");
        }
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn job_id_arg(args: &[String], command: &str) -> anyhow::Result<Uuid> {
    let raw = args
        .get(2)
        .ok_or_else(|| anyhow::anyhow!("usage: crosspostctl {command} <job_id>"))?;
    Ok(raw.parse()?)
}

async fn reset(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query("TRUNCATE TABLE job_tasks, jobs CASCADE")
        .execute(pool)
        .await?;

    println!("reset OK");
    Ok(())
}

async fn seed(repo: &JobsRepo, platforms: &[Platform], n: i64, delay_secs: i64) -> anyhow::Result<()> {
    let scheduled_at = Utc::now() + Duration::seconds(delay_secs);

    for i in 0..n {
        let job_id = repo
            .create_job(
                NewJob {
                    content_reference: format!("uploads/demo-{i}.mp4"),
                    caption: Some(format!("Demo post #{i}\nSeeded by crosspostctl")),
                    scheduled_at,
                },
                platforms,
            )
            .await?;

        println!("+ scheduled post id={job_id} at={scheduled_at}");
    }
    Ok(())
}

async fn show(repo: &JobsRepo, job_id: Uuid) -> anyhow::Result<()> {
    let Some(job) = repo.get_job(job_id).await? else {
        anyhow::bail!("job not found: {job_id}");
    };
    let tasks = repo.tasks_for_job(job_id).await?;

    println!(
        "job {} status={} scheduled_at={} published_at={}",
        job.id,
        job.status,
        job.scheduled_at,
        job.published_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".into())
    );

    for task in tasks {
        println!(
            "  - {:<9} status={:<10} attempts={} result={} error={}",
            task.platform.as_str(),
            task.status.as_str(),
            task.attempts,
            task.result_reference.as_deref().unwrap_or("-"),
            task.error.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
