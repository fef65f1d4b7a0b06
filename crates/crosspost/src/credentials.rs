//! Long-lived per-platform credentials (refresh tokens).

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::jobs::model::Platform;

/// A secret handed to an adapter. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(**redacted**)")
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credential_for(&self, platform: Platform) -> anyhow::Result<Option<Credential>>;

    async fn save_refresh_token(&self, platform: Platform, refresh_token: &str)
        -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct TokensRepo {
    pool: PgPool,
}

impl TokensRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for TokensRepo {
    async fn credential_for(&self, platform: Platform) -> anyhow::Result<Option<Credential>> {
        let token: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT refresh_token
            FROM platform_tokens
            WHERE platform = $1
            "#,
        )
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(token
            .flatten()
            .filter(|t| !t.trim().is_empty())
            .map(Credential::new))
    }

    async fn save_refresh_token(
        &self,
        platform: Platform,
        refresh_token: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_tokens (platform, refresh_token, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (platform) DO UPDATE
            SET refresh_token = EXCLUDED.refresh_token,
                updated_at = now()
            "#,
        )
        .bind(platform.as_str())
        .bind(refresh_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Fixed credentials held in memory.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    tokens: RwLock<HashMap<Platform, Credential>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, platform: Platform, secret: impl Into<String>) -> Self {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(platform, Credential::new(secret));
        }
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn credential_for(&self, platform: Platform) -> anyhow::Result<Option<Credential>> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| anyhow::anyhow!("credential lock poisoned"))?;
        Ok(tokens.get(&platform).cloned())
    }

    async fn save_refresh_token(
        &self,
        platform: Platform,
        refresh_token: &str,
    ) -> anyhow::Result<()> {
        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| anyhow::anyhow!("credential lock poisoned"))?;
        tokens.insert(platform, Credential::new(refresh_token));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let c = Credential::new("1//refresh-secret");
        assert!(!format!("{c:?}").contains("refresh-secret"));
        assert_eq!(c.expose(), "1//refresh-secret");
    }

    #[tokio::test]
    async fn static_credentials_round_trip() {
        let creds = StaticCredentials::new().with(Platform::Youtube, "tok");
        assert!(creds.credential_for(Platform::Tiktok).await.unwrap().is_none());

        creds.save_refresh_token(Platform::Tiktok, "t2").await.unwrap();
        let got = creds.credential_for(Platform::Tiktok).await.unwrap();
        assert_eq!(got.map(|c| c.expose().to_string()), Some("t2".to_string()));
    }
}
