use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

pub async fn make_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let max_connections = env_parse::<u32>("CROSSPOST_DB_MAX_CONNECTIONS")
        .unwrap_or(4)
        .clamp(1, 32);

    let acquire_timeout_secs = env_parse::<u64>("CROSSPOST_DB_ACQUIRE_TIMEOUT_SECS")
        .unwrap_or(10)
        .clamp(1, 60);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // short OLTP statements only; planning overhead of JIT never pays off
                sqlx::query("SET jit = OFF").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await?;

    tracing::debug!(max_connections, acquire_timeout_secs, "database pool ready");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("migrations applied");
    Ok(())
}
