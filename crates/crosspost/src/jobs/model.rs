use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
    Tiktok,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Youtube, Platform::Instagram, Platform::Tiktok];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "youtube" => Ok(Platform::Youtube),
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::Tiktok),
            _ => Err(ParseError::new("platform", s)),
        }
    }
}

/// Aggregate status of a job. Once off `queued` it never returns there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    /// Reopened after a failed task was requeued for retry.
    Processing,
    Published,
    Failed,
    Partial,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Published => "published",
            JobStatus::Failed => "failed",
            JobStatus::Partial => "partial",
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(
            self,
            JobStatus::Published | JobStatus::Failed | JobStatus::Partial
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "published" => Ok(JobStatus::Published),
            "failed" => Ok(JobStatus::Failed),
            "partial" => Ok(JobStatus::Partial),
            _ => Err(ParseError::new("job status", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Published,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Published => "published",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Published | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "published" => Ok(TaskStatus::Published),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(ParseError::new("task status", s)),
        }
    }
}

/// A post: one piece of content to distribute to several platforms.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub content_reference: String,
    pub caption: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub status: JobStatus,
    pub published_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Open for delivery and due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, JobStatus::Queued | JobStatus::Processing) && self.scheduled_at <= now
    }
}

/// One platform-specific delivery attempt, owned by a job.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: Uuid,
    pub job_id: Uuid,
    pub platform: Platform,
    pub status: TaskStatus,
    pub attempts: i32,
    pub result_reference: Option<String>,
    pub error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    /// Identifies the current claim holder; result writes must present it.
    #[serde(skip_serializing)]
    pub claim_token: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub content_reference: String,
    pub caption: Option<String>,
    pub scheduled_at: DateTime<Utc>,
}

fn decode_column<T: FromStr<Err = ParseError>>(row: &PgRow, column: &str) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: ParseError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> FromRow<'r, PgRow> for Job {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            content_reference: row.try_get("content_reference")?,
            caption: row.try_get("caption")?,
            scheduled_at: row.try_get("scheduled_at")?,
            status: decode_column(row, "status")?,
            published_at: row.try_get("published_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Task {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            platform: decode_column(row, "platform")?,
            status: decode_column(row, "status")?,
            attempts: row.try_get("attempts")?,
            result_reference: row.try_get("result_reference")?,
            error: row.try_get("error")?,
            published_at: row.try_get("published_at")?,
            claimed_at: row.try_get("claimed_at")?,
            claim_token: row.try_get("claim_token")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
