use chrono::Duration;

use crate::error::ParseError;
use crate::jobs::model::Platform;
use crate::jobs::reconciler::ReconcilerConfig;
use crate::jobs::retry::RetryConfig;

/// Where content bytes live. `url` wins over `dir` when both are set.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub url: Option<String>,
    pub dir: Option<String>,
    pub bucket: String,
    pub token: Option<String>,
}

/// Google OAuth client used for YouTube uploads.
#[derive(Clone, Debug)]
pub struct YoutubeConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub privacy_status: String,
}

/// Runtime configuration, read from `CROSSPOST_<KEY>` with an unprefixed fallback.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub worker_id: String,
    pub api_addr: Option<String>,
    pub worker_secret: Option<String>,
    pub migrate_on_startup: bool,

    pub batch_size: i64,
    pub task_concurrency: usize,
    pub lease_seconds: i64,
    pub poll_interval_secs: u64,

    pub max_task_attempts: i32,
    pub retry_base_seconds: i64,
    pub retry_max_seconds: i64,
    pub maintenance_interval_secs: u64,

    /// Intake fan-out when a request names no platforms.
    pub platforms: Vec<Platform>,
    /// Platforms served by the simulated adapter instead of a live API.
    pub simulated_platforms: Vec<Platform>,

    pub storage: StorageConfig,
    pub youtube: Option<YoutubeConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| env_or_fallback(&get, key);

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let worker_id = var("WORKER_ID")
            .or_else(|| get("HOSTNAME"))
            .unwrap_or_else(|| "worker-1".to_string());

        let api_addr = var("API_ADDR").and_then(|s| normalize_optional_addr(&s));
        let worker_secret = var("WORKER_SECRET");
        let migrate_on_startup = var("MIGRATE_ON_STARTUP").map(|v| is_truthy(&v)).unwrap_or(false);

        let batch_size = parse_or(var("BATCH_SIZE"), 20_i64).clamp(1, 1000);
        let task_concurrency = parse_or(var("TASK_CONCURRENCY"), 1_usize).clamp(1, 64);
        let lease_seconds = parse_or(var("LEASE_SECONDS"), 1800_i64).max(0);
        let poll_interval_secs = parse_or(var("POLL_INTERVAL_SECS"), 0_u64);

        let max_task_attempts = parse_or(var("MAX_TASK_ATTEMPTS"), 1_i32).max(1);
        let retry_base_seconds = parse_or(var("RETRY_BASE_SECONDS"), 60_i64).max(1);
        let retry_max_seconds = parse_or(var("RETRY_MAX_SECONDS"), 3600_i64).max(retry_base_seconds);
        let maintenance_interval_secs = parse_or(var("MAINTENANCE_INTERVAL_SECS"), 60_u64).max(1);

        let platforms = match var("PLATFORMS") {
            Some(raw) => parse_platforms(&raw)?,
            None => Platform::ALL.to_vec(),
        };
        if platforms.is_empty() {
            anyhow::bail!("PLATFORMS must name at least one platform");
        }
        let simulated_platforms = match var("SIMULATED_PLATFORMS") {
            Some(raw) => parse_platforms(&raw)?,
            None => Vec::new(),
        };

        let storage = StorageConfig {
            url: var("STORAGE_URL"),
            dir: var("STORAGE_DIR"),
            bucket: var("STORAGE_BUCKET").unwrap_or_else(|| "videos".to_string()),
            token: var("STORAGE_TOKEN"),
        };

        let youtube = match (var("GOOGLE_CLIENT_ID"), var("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(YoutubeConfig {
                client_id,
                client_secret,
                redirect_uri: var("GOOGLE_REDIRECT_URI")
                    .unwrap_or_else(|| "http://localhost:8080/youtube/callback".to_string()),
                privacy_status: var("YOUTUBE_PRIVACY_STATUS")
                    .unwrap_or_else(|| "private".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            worker_id,
            api_addr,
            worker_secret,
            migrate_on_startup,
            batch_size,
            task_concurrency,
            lease_seconds,
            poll_interval_secs,
            max_task_attempts,
            retry_base_seconds,
            retry_max_seconds,
            maintenance_interval_secs,
            platforms,
            simulated_platforms,
            storage,
            youtube,
        })
    }

    /// `None` when lease reclaim is disabled (`LEASE_SECONDS=0`).
    pub fn lease(&self) -> Option<Duration> {
        (self.lease_seconds > 0).then(|| Duration::seconds(self.lease_seconds))
    }

    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            batch_size: self.batch_size,
            task_concurrency: self.task_concurrency,
            lease: self.lease(),
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_task_attempts,
            base_seconds: self.retry_base_seconds,
            max_seconds: self.retry_max_seconds,
            ..RetryConfig::default()
        }
    }
}

/// Comma separated platform names, deduplicated, order kept.
pub fn parse_platforms(raw: &str) -> Result<Vec<Platform>, ParseError> {
    let mut out = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let platform: Platform = name.parse()?;
        if !out.contains(&platform) {
            out.push(platform);
        }
    }
    Ok(out)
}

fn env_or_fallback(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    get(&format!("CROSSPOST_{key}"))
        .filter(|s| !s.trim().is_empty())
        .or_else(|| get(key).filter(|s| !s.trim().is_empty()))
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() || matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
