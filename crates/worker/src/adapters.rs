use std::sync::Arc;

use crosspost::config::Config;
use crosspost::content::{FsObjectStore, HttpObjectStore, ObjectStore};
use crosspost::jobs::Platform;
use crosspost::platforms::{AdapterRegistry, SimulatedAdapter, YoutubeAdapter};

/// One adapter per platform the worker can serve. Platforms listed in
/// `SIMULATED_PLATFORMS` always get the simulated adapter.
pub fn build_registry(cfg: &Config, http: &reqwest::Client) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();

    let mut wanted = cfg.platforms.clone();
    for p in &cfg.simulated_platforms {
        if !wanted.contains(p) {
            wanted.push(*p);
        }
    }

    for platform in wanted {
        if cfg.simulated_platforms.contains(&platform) {
            registry.register(Arc::new(SimulatedAdapter::new(platform)));
            continue;
        }

        match (platform, cfg.youtube.as_ref()) {
            (Platform::Youtube, Some(yt)) => {
                registry.register(Arc::new(YoutubeAdapter::new(http.clone(), yt.clone())));
            }
            (Platform::Youtube, None) => {
                tracing::warn!("youtube: GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET unset, platform not served");
            }
            (other, _) => {
                tracing::warn!(
                    platform = %other,
                    "no live integration; list it in SIMULATED_PLATFORMS to serve it"
                );
            }
        }
    }

    registry
}

pub fn build_object_store(
    cfg: &Config,
    http: &reqwest::Client,
) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let storage = &cfg.storage;

    if let Some(url) = &storage.url {
        return Ok(Arc::new(HttpObjectStore::new(
            http.clone(),
            url.clone(),
            storage.bucket.clone(),
            storage.token.clone(),
        )));
    }
    if let Some(dir) = &storage.dir {
        return Ok(Arc::new(FsObjectStore::new(dir.clone())));
    }

    anyhow::bail!("STORAGE_URL or STORAGE_DIR must be set")
}
