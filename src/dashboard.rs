//! Dashboard statistics snapshot persisted across sessions.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{
    client::RequestOptions, storage::KeyValueStore, types::VectorStoreStats, ApiClient, Result,
};

pub const STATS_KEY: &str = "dashboard_stats";
pub const LAST_FETCH_KEY: &str = "dashboard_lastFetchTime";
pub const EXPIRY_KEY: &str = "dashboard_cacheExpiry";

/// How long a fetched snapshot is served without refetching.
pub const CACHE_DURATION: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Default)]
struct Snapshot {
    stats: Option<VectorStoreStats>,
    /// Unix milliseconds.
    last_fetch: Option<u64>,
    /// Unix milliseconds.
    expiry: Option<u64>,
}

/// Cached knowledge-base statistics for the dashboard.
///
/// The snapshot is restored from the key-value port on construction and
/// written back after every successful fetch.
pub struct DashboardCache {
    storage: Arc<dyn KeyValueStore>,
    snapshot: Mutex<Snapshot>,
}

impl std::fmt::Debug for DashboardCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardCache")
            .field("snapshot", &*self.snapshot())
            .finish_non_exhaustive()
    }
}

impl DashboardCache {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let snapshot = Snapshot {
            stats: load(storage.as_ref(), STATS_KEY),
            last_fetch: load(storage.as_ref(), LAST_FETCH_KEY),
            expiry: load(storage.as_ref(), EXPIRY_KEY),
        };
        Self {
            storage,
            snapshot: Mutex::new(snapshot),
        }
    }

    fn snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the cached stats while they are valid, otherwise fetches
    /// `GET /knowledge/stats` without a loading indicator.
    pub async fn fetch_stats(
        &self,
        client: &ApiClient,
        force_refresh: bool,
    ) -> Result<VectorStoreStats> {
        if !force_refresh {
            if let Some(stats) = self.valid_stats() {
                #[cfg(feature = "tracing")]
                tracing::debug!("serving dashboard stats from cache");
                return Ok(stats);
            }
        }

        let fetched = client
            .knowledge()
            .with_options(RequestOptions::background())
            .stats()
            .await?;
        let stats = fetched.vector_store;

        let now = now_millis();
        let expiry = now + CACHE_DURATION.as_millis() as u64;
        {
            let mut snapshot = self.snapshot();
            snapshot.stats = Some(stats.clone());
            snapshot.last_fetch = Some(now);
            snapshot.expiry = Some(expiry);
        }
        store(self.storage.as_ref(), STATS_KEY, &stats);
        store(self.storage.as_ref(), LAST_FETCH_KEY, &now);
        store(self.storage.as_ref(), EXPIRY_KEY, &expiry);

        #[cfg(feature = "tracing")]
        tracing::debug!(total_documents = stats.total_documents, "dashboard stats updated");
        Ok(stats)
    }

    pub async fn refresh_stats(&self, client: &ApiClient) -> Result<VectorStoreStats> {
        self.fetch_stats(client, true).await
    }

    fn valid_stats(&self) -> Option<VectorStoreStats> {
        let snapshot = self.snapshot();
        if !snapshot_valid(&snapshot) {
            return None;
        }
        snapshot.stats.clone()
    }

    /// Current snapshot, valid or not.
    pub fn stats(&self) -> Option<VectorStoreStats> {
        self.snapshot().stats.clone()
    }

    /// True once any snapshot was fetched or restored, even an empty one.
    pub fn has_data(&self) -> bool {
        self.snapshot().stats.is_some()
    }

    pub fn is_cache_valid(&self) -> bool {
        snapshot_valid(&self.snapshot())
    }

    pub fn should_refresh(&self) -> bool {
        let snapshot = self.snapshot();
        snapshot.last_fetch.is_none() || !snapshot_valid(&snapshot)
    }

    /// When the snapshot was last fetched.
    pub fn last_fetch(&self) -> Option<SystemTime> {
        self.snapshot()
            .last_fetch
            .map(|millis| UNIX_EPOCH + Duration::from_millis(millis))
    }

    /// Drops the snapshot in memory and in storage.
    pub fn clear(&self) {
        *self.snapshot() = Snapshot::default();
        for key in [STATS_KEY, LAST_FETCH_KEY, EXPIRY_KEY] {
            self.storage.remove(key);
        }
    }

    /// Invalidates the snapshot so the next fetch goes to the network, e.g.
    /// after an upload or delete changed the document set.
    pub fn mark_for_refresh(&self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("dashboard stats marked for refresh");
        self.clear();
    }

    pub fn provider_count(&self, provider: &str) -> u64 {
        self.provider_share(provider, |share| share.count)
            .unwrap_or(0)
    }

    pub fn provider_percentage(&self, provider: &str) -> f64 {
        self.provider_share(provider, |share| share.percentage)
            .unwrap_or(0.0)
    }

    fn provider_share<T>(
        &self,
        provider: &str,
        pick: impl FnOnce(&crate::types::ProviderShare) -> T,
    ) -> Option<T> {
        self.snapshot()
            .stats
            .as_ref()?
            .provider_distribution
            .get(provider)
            .map(pick)
    }
}

fn snapshot_valid(snapshot: &Snapshot) -> bool {
    snapshot.expiry.is_some_and(|expiry| now_millis() < expiry)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn load<T: DeserializeOwned>(storage: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = storage.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(key, error = %_err, "failed to parse stored dashboard data");
            None
        }
    }
}

fn store<T: Serialize>(storage: &dyn KeyValueStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => storage.set(key, raw),
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(key, error = %_err, "failed to store dashboard data");
        }
    }
}
