use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PassError;
use crate::jobs::model::{Job, Platform, Task};
use crate::jobs::reconciler::{PassReport, PassStats};

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    pub key: Option<String>,
    pub platform: Option<String>,
}

/// Outcome of one platform pass as reported by the trigger endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PassOutcome {
    pub platform: Platform,
    pub ok: bool,
    pub published: usize,
    pub debug: PassStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PassOutcome {
    pub fn from_result(platform: Platform, result: Result<PassReport, PassError>) -> Self {
        match result {
            Ok(report) => Self {
                platform,
                ok: true,
                published: report.published,
                debug: report.debug,
                error: None,
            },
            Err(e) => Self {
                platform,
                ok: false,
                published: 0,
                debug: PassStats::default(),
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub ok: bool,
    pub published: usize,
    pub debug: PassStats,
    pub passes: Vec<PassOutcome>,
}

impl RunResponse {
    pub fn from_passes(passes: Vec<PassOutcome>) -> Self {
        let mut debug = PassStats::default();
        for pass in &passes {
            debug.absorb(&pass.debug);
        }

        Self {
            ok: passes.iter().all(|p| p.ok),
            published: debug.published,
            debug,
            passes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content_reference: String,
    pub caption: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub platforms: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct CreatePostResponse {
    pub ok: bool,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PostView {
    pub job: Job,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OAuthCallbackResponse {
    pub ok: bool,
    pub refresh_token_stored: bool,
}
