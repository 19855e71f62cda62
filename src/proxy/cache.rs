//! Pool cache persistence.
//!
//! Pool state (fresh + gateway collections and the refresh timestamp) is
//! persisted to a JSON file and reloaded on startup so a restart within
//! the TTL window skips network discovery. The cache is advisory: a
//! missing, corrupt, or expired file just forces a live refresh.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::record::ProxyRecord;

/// On-disk pool snapshot. Overwritten wholesale on every successful
/// refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolCache {
    /// The fresh (host:port) collection
    pub fresh_proxies: Vec<ProxyRecord>,
    /// The gateway collection
    pub gateway_proxies: Vec<ProxyRecord>,
    /// When the pool last completed a live refresh
    pub last_update: Option<DateTime<Utc>>,
    /// When this file was written
    pub saved_at: DateTime<Utc>,
}

impl PoolCache {
    /// Number of working proxies in the snapshot.
    pub fn working_count(&self) -> usize {
        self.fresh_proxies
            .iter()
            .chain(self.gateway_proxies.iter())
            .filter(|p| p.working)
            .count()
    }
}

/// Loads a non-expired cache snapshot.
///
/// Returns `None` (after a debug log) when the file is missing, unreadable,
/// corrupt, or older than `ttl`; callers fall through to live discovery.
pub async fn load(path: &Path, ttl: Duration) -> Option<PoolCache> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            log::debug!("Pool cache not read from {}: {}", path.display(), e);
            return None;
        }
    };

    let cache: PoolCache = match serde_json::from_str(&raw) {
        Ok(cache) => cache,
        Err(e) => {
            log::debug!("Pool cache at {} is corrupt: {}", path.display(), e);
            return None;
        }
    };

    let age = Utc::now().signed_duration_since(cache.saved_at);
    match age.to_std() {
        Ok(age) if age <= ttl => Some(cache),
        _ => {
            log::debug!("Pool cache at {} expired", path.display());
            None
        }
    }
}

/// Writes the snapshot, creating parent directories as needed.
pub async fn save(path: &Path, cache: &PoolCache) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create cache directory")?;
        }
    }

    let json = serde_json::to_string_pretty(cache).context("Failed to serialize pool cache")?;
    fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write pool cache to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::record::ProxyKind;
    use tempfile::TempDir;

    fn sample_cache() -> PoolCache {
        let mut working = ProxyRecord::new("1.2.3.4", 8080, ProxyKind::Http);
        working.mark_working(Duration::from_millis(200), Duration::from_secs(8));
        let dead = ProxyRecord::new("5.6.7.8", 3128, ProxyKind::Http);

        PoolCache {
            fresh_proxies: vec![working, dead],
            gateway_proxies: vec![],
            last_update: Some(Utc::now()),
            saved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pool.json");

        save(&path, &sample_cache()).await.unwrap();
        let loaded = load(&path, Duration::from_secs(60)).await.unwrap();

        assert_eq!(loaded.fresh_proxies.len(), 2);
        assert_eq!(loaded.working_count(), 1);
        assert_eq!(loaded.fresh_proxies[0].host, "1.2.3.4");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.json");
        assert!(load(&path, Duration::from_secs(60)).await.is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pool.json");
        fs::write(&path, "{ not json").await.unwrap();
        assert!(load(&path, Duration::from_secs(60)).await.is_none());
    }

    #[tokio::test]
    async fn test_load_expired_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pool.json");

        let mut cache = sample_cache();
        cache.saved_at = Utc::now() - chrono::Duration::seconds(3600);
        save(&path, &cache).await.unwrap();

        assert!(load(&path, Duration::from_secs(60)).await.is_none());
    }

    #[tokio::test]
    async fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("pool.json");
        save(&path, &sample_cache()).await.unwrap();
        assert!(path.exists());
    }
}
