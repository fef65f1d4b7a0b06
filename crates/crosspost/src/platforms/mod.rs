//! Publishing capability, one adapter per platform.

pub mod simulated;
pub mod youtube;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::credentials::Credential;
use crate::error::PublishError;
use crate::jobs::model::Platform;

pub use simulated::SimulatedAdapter;
pub use youtube::{YoutubeAdapter, YoutubeOAuth};

pub const MAX_TITLE_CHARS: usize = 90;
pub const DEFAULT_TITLE: &str = "Video";

/// Title and description derived from a job caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishMetadata {
    pub title: String,
    pub description: String,
}

impl PublishMetadata {
    pub fn from_caption(caption: Option<&str>) -> Self {
        let description = caption.unwrap_or_default().trim().to_string();

        let first_line = description.lines().next().unwrap_or_default().trim();
        let title: String = first_line.chars().take(MAX_TITLE_CHARS).collect();
        let title = title.trim_end().to_string();

        Self {
            title: if title.is_empty() {
                DEFAULT_TITLE.to_string()
            } else {
                title
            },
            description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub external_url: String,
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// When false the reconciler skips credential resolution for this platform.
    fn requires_credential(&self) -> bool {
        true
    }

    async fn publish(
        &self,
        credential: Option<&Credential>,
        content: Vec<u8>,
        metadata: &PublishMetadata,
    ) -> Result<PublishResult, PublishError>;
}

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` for its platform, replacing any earlier one.
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn adapter_for(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
