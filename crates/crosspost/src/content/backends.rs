use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::Context;
use async_trait::async_trait;

use super::ObjectStore;

/// Object storage reachable over HTTP at `{base_url}/{bucket}/{key}`.
#[derive(Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into().trim_matches('/').to_string(),
            token,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let mut req = self.client.get(self.object_url(key));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Objects stored as plain files under `root`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.root.join(key);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("read {}", path.display()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, bytes: Vec<u8>) {
        let mut objects = self
            .objects
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        objects.insert(key.into(), bytes);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| anyhow::anyhow!("object store lock poisoned"))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("object not found"))
    }
}
