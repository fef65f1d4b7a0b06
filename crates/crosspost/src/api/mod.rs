use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::credentials::CredentialStore;
use crate::jobs::model::{NewJob, Platform};
use crate::jobs::reconciler::Reconciler;
use crate::jobs::store::JobStore;
use crate::platforms::YoutubeOAuth;

pub mod gate;
pub mod models;

pub use gate::SharedSecretGate;
use models::{
    CreatePostRequest, CreatePostResponse, ErrorBody, HealthResponse, OAuthCallbackQuery,
    OAuthCallbackResponse, PassOutcome, PostView, RunQuery, RunResponse,
};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn JobStore>,
    pub reconciler: Reconciler,
    pub gate: SharedSecretGate,
    pub credentials: Arc<dyn CredentialStore>,
    /// Fan-out used when a new post names no platforms.
    pub default_platforms: Vec<Platform>,
    pub youtube: Option<YoutubeOAuth>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Trigger
        .route("/worker/run", get(run_worker).post(run_worker))
        // Intake / inspect
        .route("/posts", post(create_post))
        .route("/posts/:id", get(get_post))
        // YouTube consent flow
        .route("/youtube/auth", get(youtube_auth))
        .route("/youtube/callback", get(youtube_callback))
        // Health
        .route("/health", get(health))
        .with_state(state)
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(msg))).into_response()
}

fn internal_err(e: anyhow::Error) -> Response {
    tracing::error!(error = %e, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {e}"))
}

pub async fn run_worker(
    State(state): State<ApiState>,
    Query(query): Query<RunQuery>,
    headers: HeaderMap,
) -> Response {
    if !state.gate.check(query.key.as_deref(), &headers) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let passes = match query.platform.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let platform: Platform = match raw.parse() {
                Ok(p) => p,
                Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
            };
            let result = state.reconciler.run_pass(platform).await;
            vec![PassOutcome::from_result(platform, result)]
        }
        None => state
            .reconciler
            .run_all()
            .await
            .into_iter()
            .map(|(platform, result)| PassOutcome::from_result(platform, result))
            .collect(),
    };

    let body = RunResponse::from_passes(passes);
    let status = if body.ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(body)).into_response()
}

pub async fn create_post(
    State(state): State<ApiState>,
    Json(body): Json<CreatePostRequest>,
) -> Response {
    let CreatePostRequest {
        content_reference,
        caption,
        scheduled_at,
        platforms,
    } = body;

    let content_reference = content_reference.trim().to_string();
    if content_reference.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "content_reference is required");
    }

    let platforms = match platforms {
        Some(names) => {
            let mut parsed = Vec::with_capacity(names.len());
            for name in &names {
                match name.parse::<Platform>() {
                    Ok(p) if !parsed.contains(&p) => parsed.push(p),
                    Ok(_) => {}
                    Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
                }
            }
            parsed
        }
        None => state.default_platforms.clone(),
    };
    if platforms.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "at least one platform is required");
    }

    let job = NewJob {
        content_reference,
        caption: caption.filter(|c| !c.trim().is_empty()),
        scheduled_at: scheduled_at.unwrap_or_else(Utc::now),
    };

    match state.store.create_job(job, &platforms).await {
        Ok(job_id) => {
            tracing::info!(%job_id, platforms = platforms.len(), "post scheduled");
            Json(CreatePostResponse { ok: true, job_id }).into_response()
        }
        Err(e) => internal_err(e),
    }
}

pub async fn get_post(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    let job = match state.store.get_job(id).await {
        Ok(Some(job)) => job,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "post not found"),
        Err(e) => return internal_err(e),
    };

    match state.store.tasks_for_job(id).await {
        Ok(tasks) => Json(PostView { job, tasks }).into_response(),
        Err(e) => internal_err(e),
    }
}

pub async fn youtube_auth(State(state): State<ApiState>) -> Response {
    let Some(oauth) = state.youtube.as_ref() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "youtube client not configured");
    };

    match oauth.authorize_url() {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => internal_err(e),
    }
}

pub async fn youtube_callback(
    State(state): State<ApiState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    let Some(oauth) = state.youtube.as_ref() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "youtube client not configured");
    };

    if let Some(err) = query.error {
        return error_response(StatusCode::BAD_REQUEST, format!("consent denied: {err}"));
    }
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "missing code");
    };

    let grant = match oauth.exchange_code(&code).await {
        Ok(grant) => grant,
        Err(e) => return error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    };

    // Google omits the refresh token on repeat consent; keep the stored one then.
    let mut stored = false;
    if let Some(refresh_token) = grant.refresh_token.as_deref() {
        if let Err(e) = state
            .credentials
            .save_refresh_token(Platform::Youtube, refresh_token)
            .await
        {
            return internal_err(e);
        }
        stored = true;
        tracing::info!("youtube refresh token stored");
    }

    Json(OAuthCallbackResponse {
        ok: true,
        refresh_token_stored: stored,
    })
    .into_response()
}

pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                ok: true,
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                ok: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}
