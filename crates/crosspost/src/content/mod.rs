//! Resolves a job's content reference to bytes.
//!
//! References come in two shapes: a bare storage key (`uploads/x.mp4`,
//! possibly with leading slashes) or a full URL to the object, in which case
//! the key is whatever follows the `/<bucket>/` marker in the path.

pub mod backends;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FetchError;

pub use backends::{FsObjectStore, HttpObjectStore, MemoryObjectStore};

/// Byte storage addressed by canonical key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Canonical storage key for `reference`, or `None` when nothing usable remains.
pub fn normalize_reference(reference: &str, bucket: &str) -> Option<String> {
    let reference = reference.trim();

    let key = match reference.split_once("://") {
        Some((scheme, rest))
            if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") =>
        {
            let rest = rest.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
            let path = rest.split_once('/').map(|(_, p)| p).unwrap_or_default();
            let marker = format!("{}/", bucket.trim_matches('/'));

            // match on whole segments so "videos2/..." never counts as "videos/..."
            let path = format!("/{path}");
            match path.find(&format!("/{marker}")) {
                Some(idx) => path[idx + marker.len() + 1..].to_string(),
                None => path,
            }
        }
        _ => reference.to_string(),
    };

    let key = key.trim_start_matches('/');
    if key.is_empty() || key.split('/').any(|segment| segment == "..") {
        return None;
    }
    Some(key.to_string())
}

#[derive(Clone)]
pub struct ContentFetcher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ContentFetcher {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn fetch(&self, reference: &str) -> Result<Vec<u8>, FetchError> {
        let key = normalize_reference(reference, &self.bucket)
            .ok_or_else(|| FetchError::InvalidReference(reference.to_string()))?;

        self.store
            .get(&key)
            .await
            .map_err(|e| FetchError::Unavailable(format!("{key}: {e:#}")))
    }
}
