//! Process-wide API state: response cache, request counters, loading flag
//! and latest error.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    classify::ErrorRecord,
    observer::{NoopObserver, Notifier},
    ApiClient, ApiError, Result,
};

/// TTL applied by [`ApiStore::set`].
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// Errors below this count keep the store healthy.
pub const HEALTHY_ERROR_THRESHOLD: u64 = 5;

/// Builds a cache key from an operation prefix and parameters.
///
/// Parameters are sorted by name and joined as `k=v` pairs, so the same
/// parameters in any order produce the same key.
pub fn cache_key<I, K, V>(prefix: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: ToString,
{
    let mut pairs: Vec<(String, String)> = params
        .into_iter()
        .map(|(key, value)| (key.as_ref().to_owned(), value.to_string()))
        .collect();
    pairs.sort();
    let joined = pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{prefix}:{joined}")
}

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub inserted_at: Instant,
    /// `None` when `inserted_at + ttl` is past the clock's range; such an
    /// entry never expires.
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

/// Snapshot of the request counters.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestStats {
    pub total_requests: u64,
    pub total_errors: u64,
    pub last_request: Option<SystemTime>,
    /// `total_errors / total_requests * 100`, or 0 before any request.
    pub error_rate: f64,
    /// Fewer than [`HEALTHY_ERROR_THRESHOLD`] errors in total.
    pub is_healthy: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    loading: bool,
    error: Option<ErrorRecord>,
    request_count: u64,
    error_count: u64,
    last_request: Option<SystemTime>,
    entries: HashMap<String, CacheEntry>,
}

/// Shared API state. Clones share the same state.
///
/// Expired cache entries are removed lazily by the read that finds them;
/// there is no background sweep.
#[derive(Clone)]
pub struct ApiStore {
    state: Arc<Mutex<StoreState>>,
    notifier: Arc<dyn Notifier>,
}

impl Default for ApiStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ApiStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ApiStore")
            .field("loading", &state.loading)
            .field("request_count", &state.request_count)
            .field("error_count", &state.error_count)
            .field("entries", &state.entries.len())
            .finish()
    }
}

impl ApiStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            notifier: Arc::new(NoopObserver),
        }
    }

    /// Uses `notifier` for the notification raised by
    /// [`record_error`](Self::record_error).
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Caches `value` for [`DEFAULT_TTL`].
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.set_with_ttl(key, value, DEFAULT_TTL);
    }

    /// Caches `value` until `now + ttl`, replacing any entry for `key`.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: serde_json::Value, ttl: Duration) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            inserted_at: now,
            expires_at: now.checked_add(ttl),
        };
        self.state().entries.insert(key.into(), entry);
    }

    /// Returns the cached value while it is live; an expired entry is
    /// removed and reported absent.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        let mut state = self.state();
        match state.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Serializes and caches a typed value.
    pub fn set_as<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|err| ApiError::Config(format!("could not encode cache value: {err}")))?;
        self.set_with_ttl(key, value, ttl);
        Ok(())
    }

    /// Reads a typed value. Entries that no longer decode are treated as
    /// absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        serde_json::from_value(self.get(key)?).ok()
    }

    /// Removes one entry, or every entry when `key` is `None`.
    pub fn clear(&self, key: Option<&str>) {
        let mut state = self.state();
        match key {
            Some(key) => {
                state.entries.remove(key);
            }
            None => state.entries.clear(),
        }
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record_request(&self) {
        let mut state = self.state();
        state.request_count += 1;
        state.last_request = Some(SystemTime::now());
    }

    /// Counts and stores `record`, then raises a notification with its
    /// message.
    pub fn record_error(&self, record: ErrorRecord) {
        let message = record.message.clone();
        self.store_error(record);
        self.notifier.notify_error(&message);
    }

    fn store_error(&self, record: ErrorRecord) {
        let mut state = self.state();
        state.error_count += 1;
        state.error = Some(record);
    }

    pub fn clear_error(&self) {
        self.state().error = None;
    }

    pub fn error(&self) -> Option<ErrorRecord> {
        self.state().error.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.state().error.as_ref().map(|error| error.message.clone())
    }

    pub fn set_loading(&self, loading: bool) {
        self.state().loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    pub fn is_healthy(&self) -> bool {
        self.state().error_count < HEALTHY_ERROR_THRESHOLD
    }

    pub fn stats(&self) -> RequestStats {
        let state = self.state();
        let error_rate = if state.request_count == 0 {
            0.0
        } else {
            state.error_count as f64 / state.request_count as f64 * 100.0
        };
        RequestStats {
            total_requests: state.request_count,
            total_errors: state.error_count,
            last_request: state.last_request,
            error_rate,
            is_healthy: state.error_count < HEALTHY_ERROR_THRESHOLD,
        }
    }

    /// Zeroes counters, clears the error, the cache and the loading flag.
    pub fn reset(&self) {
        *self.state() = StoreState::default();
    }

    /// Runs `operation` as one tracked request.
    ///
    /// The request is counted and the loading flag held for its duration.
    /// There is a single flag: when several tracked operations overlap, the
    /// first one to finish clears it while the others are still running.
    /// A failure is recorded without a notification, since the client
    /// already notified when it dispatched the request, and is then
    /// returned unchanged.
    pub async fn track<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.record_request();
        self.set_loading(true);
        self.clear_error();

        let outcome = operation.await;

        if let Err(err) = &outcome {
            self.store_error(ErrorRecord::from_error(err));
        }
        self.set_loading(false);
        outcome
    }

    /// Calls the health endpoint as a tracked request.
    pub async fn check_health(&self, client: &ApiClient) -> bool {
        self.track(client.admin().health())
            .await
            .is_ok_and(|report| report.is_healthy())
    }
}
