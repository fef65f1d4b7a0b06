use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

/// Backoff policy for requeueing failed tasks.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts a task may use. 1 disables automatic retry.
    pub max_attempts: i32,
    pub base_seconds: i64,
    pub max_seconds: i64,
    pub jitter_pct: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_seconds: 60,
            max_seconds: 60 * 60,
            jitter_pct: 0.20,
        }
    }
}

impl RetryConfig {
    pub fn enabled(&self) -> bool {
        self.max_attempts > 1
    }
}

/// Delay before the task that has failed `attempts` times may run again:
/// `base * 2^(attempts-1)`, capped at `max_seconds`, with symmetric jitter.
pub fn next_delay_seconds(attempts: i32, cfg: &RetryConfig, rng: &mut impl Rng) -> i64 {
    let exp = (attempts.max(1) as u32).saturating_sub(1);

    // 2^exp overflows past 62; the cap takes over anyway
    let pow2 = 1_i64.checked_shl(exp).unwrap_or(i64::MAX);
    let delay = cfg.base_seconds.saturating_mul(pow2).min(cfg.max_seconds);

    let jitter_range = (delay as f64) * cfg.jitter_pct;
    let jitter = if jitter_range > 0.0 {
        rng.gen_range(-jitter_range..=jitter_range)
    } else {
        0.0
    };

    ((delay as f64 + jitter).round() as i64).clamp(0, cfg.max_seconds)
}

/// Jitter source fixed per task and attempt, so repeated checks agree on
/// one delay instead of redrawing it.
fn task_rng(task_id: Uuid, attempts: i32) -> StdRng {
    let id = task_id.as_u128();
    StdRng::seed_from_u64((id as u64) ^ ((id >> 64) as u64) ^ (attempts as u64))
}

/// Delay for `task_id` after its `attempts`-th failure. Stable across calls.
pub fn task_delay_seconds(task_id: Uuid, attempts: i32, cfg: &RetryConfig) -> i64 {
    next_delay_seconds(attempts, cfg, &mut task_rng(task_id, attempts))
}

/// True once a task that failed at `failed_at` has waited out its backoff.
pub fn backoff_elapsed(
    task_id: Uuid,
    attempts: i32,
    failed_at: DateTime<Utc>,
    now: DateTime<Utc>,
    cfg: &RetryConfig,
) -> bool {
    failed_at + Duration::seconds(task_delay_seconds(task_id, attempts, cfg)) <= now
}
