use async_trait::async_trait;
use uuid::Uuid;

use super::{PlatformAdapter, PublishMetadata, PublishResult};
use crate::credentials::Credential;
use crate::error::PublishError;
use crate::jobs::model::Platform;

/// Stand-in for platforms without a live API integration. Publishes nothing.
#[derive(Debug, Clone)]
pub struct SimulatedAdapter {
    platform: Platform,
}

impl SimulatedAdapter {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl PlatformAdapter for SimulatedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn requires_credential(&self) -> bool {
        false
    }

    async fn publish(
        &self,
        _credential: Option<&Credential>,
        content: Vec<u8>,
        metadata: &PublishMetadata,
    ) -> Result<PublishResult, PublishError> {
        if content.is_empty() {
            return Err(PublishError::new("refusing to publish empty content"));
        }

        tracing::info!(
            platform = %self.platform,
            bytes = content.len(),
            title = %metadata.title,
            "simulated publish"
        );

        Ok(PublishResult {
            external_url: format!(
                "simulated://published/{}/{}",
                self.platform,
                Uuid::new_v4()
            ),
        })
    }
}
