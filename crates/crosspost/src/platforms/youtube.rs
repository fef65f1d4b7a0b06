//! YouTube Data API v3: OAuth2 refresh-token exchange and resumable upload.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::{PlatformAdapter, PublishMetadata, PublishResult};
use crate::config::YoutubeConfig;
use crate::credentials::Credential;
use crate::error::PublishError;
use crate::jobs::model::Platform;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube",
];

/// Keeps provider error bodies out of task rows past this length.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

async fn ensure_success(
    resp: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, PublishError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    Err(PublishError::new(format!("{what} failed ({status}): {body}")))
}

/// OAuth2 client for the consent flow and token refresh.
#[derive(Clone)]
pub struct YoutubeOAuth {
    client: reqwest::Client,
    cfg: YoutubeConfig,
}

impl YoutubeOAuth {
    pub fn new(client: reqwest::Client, cfg: YoutubeConfig) -> Self {
        Self { client, cfg }
    }

    /// Consent URL requesting offline access so Google returns a refresh token.
    pub fn authorize_url(&self) -> anyhow::Result<String> {
        let scope = SCOPES.join(" ");
        let url = reqwest::Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.cfg.client_id.as_str()),
                ("redirect_uri", self.cfg.redirect_uri.as_str()),
                ("response_type", "code"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("scope", scope.as_str()),
                ("include_granted_scopes", "true"),
            ],
        )?;
        Ok(url.to_string())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, PublishError> {
        self.token_request(&[
            ("code", code),
            ("client_id", &self.cfg.client_id),
            ("client_secret", &self.cfg.client_secret),
            ("redirect_uri", &self.cfg.redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, PublishError> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", &self.cfg.client_id),
            ("client_secret", &self.cfg.client_secret),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, PublishError> {
        let resp = self.client.post(TOKEN_URL).form(form).send().await?;
        let resp = ensure_success(resp, "token request").await?;
        Ok(resp.json::<TokenGrant>().await?)
    }
}

struct CachedToken {
    refresh_token: String,
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct YoutubeAdapter {
    client: reqwest::Client,
    oauth: YoutubeOAuth,
    privacy_status: String,
    cached: Mutex<Option<CachedToken>>,
}

impl YoutubeAdapter {
    pub fn new(client: reqwest::Client, cfg: YoutubeConfig) -> Self {
        let privacy_status = cfg.privacy_status.clone();
        Self {
            oauth: YoutubeOAuth::new(client.clone(), cfg),
            client,
            privacy_status,
            cached: Mutex::new(None),
        }
    }

    async fn access_token(&self, credential: &Credential) -> Result<String, PublishError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.refresh_token == credential.expose()
                && token.expires_at > now + Duration::seconds(60)
            {
                return Ok(token.access_token.clone());
            }
        }

        let grant = self.oauth.refresh(credential.expose()).await?;
        *cached = Some(CachedToken {
            refresh_token: credential.expose().to_string(),
            access_token: grant.access_token.clone(),
            expires_at: now + Duration::seconds(grant.expires_in),
        });
        Ok(grant.access_token)
    }
}

#[async_trait]
impl PlatformAdapter for YoutubeAdapter {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn publish(
        &self,
        credential: Option<&Credential>,
        content: Vec<u8>,
        metadata: &PublishMetadata,
    ) -> Result<PublishResult, PublishError> {
        let credential =
            credential.ok_or_else(|| PublishError::new("youtube upload requires a refresh token"))?;
        let access_token = self.access_token(credential).await?;

        // 1) open a resumable upload session
        let session = self
            .client
            .post(UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&access_token)
            .header("X-Upload-Content-Type", "video/*")
            .header("X-Upload-Content-Length", content.len().to_string())
            .json(&json!({
                "snippet": {
                    "title": metadata.title,
                    "description": metadata.description,
                },
                "status": {
                    "privacyStatus": self.privacy_status,
                },
            }))
            .send()
            .await?;
        let session = ensure_success(session, "upload session").await?;

        let upload_url = session
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::new("upload session returned no Location header"))?;

        // 2) send the bytes
        let uploaded = self
            .client
            .put(upload_url)
            .bearer_auth(&access_token)
            .header(CONTENT_TYPE, "video/*")
            .body(content)
            .send()
            .await?;
        let uploaded = ensure_success(uploaded, "video upload").await?;
        let video = uploaded.json::<VideoResource>().await?;

        Ok(PublishResult {
            external_url: format!("{WATCH_URL}{}", video.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> YoutubeConfig {
        YoutubeConfig {
            client_id: "client-123".into(),
            client_secret: "shh".into(),
            redirect_uri: "https://app.example.com/youtube/callback".into(),
            privacy_status: "private".into(),
        }
    }

    #[test]
    fn authorize_url_requests_offline_consent() {
        let oauth = YoutubeOAuth::new(reqwest::Client::new(), cfg());
        let url = reqwest::Url::parse(&oauth.authorize_url().unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["redirect_uri"], "https://app.example.com/youtube/callback");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert!(params["scope"].contains("youtube.upload"));
        assert!(!params.contains_key("client_secret"));
    }

    #[tokio::test]
    async fn publish_without_credential_fails_before_any_request() {
        let adapter = YoutubeAdapter::new(reqwest::Client::new(), cfg());
        let meta = PublishMetadata::from_caption(Some("hi"));
        let err = adapter.publish(None, vec![1, 2, 3], &meta).await.unwrap_err();
        assert!(err.message.contains("refresh token"));
    }
}
