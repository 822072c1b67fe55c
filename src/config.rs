use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::KeyValueStore;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_API_VERSION: &str = "v1";

/// Storage key of the persisted API settings override.
pub const API_SETTINGS_KEY: &str = "apiSettings";

pub const ENV_BASE_URL: &str = "KB_API_BASE_URL";
pub const ENV_TIMEOUT: &str = "KB_API_TIMEOUT";
pub const ENV_API_VERSION: &str = "KB_API_VERSION";
pub const ENV_API_KEY: &str = "KB_API_KEY";
pub const ENV_ENABLE_DEBUG: &str = "KB_ENABLE_DEBUG";
pub const ENV_ENABLE_MOCK: &str = "KB_ENABLE_MOCK";
pub const ENV_APP_ENV: &str = "KB_APP_ENV";

/// Resolved client settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    /// Server origin, without the `/api/{version}` suffix.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    pub api_version: String,
    /// Optional pre-issued API key, sent as a bearer token.
    pub api_key: Option<String>,
    /// Logs every request and response at debug level.
    pub debug: bool,
    pub mock: bool,
    pub environment: AppEnvironment,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            api_version: DEFAULT_API_VERSION.to_owned(),
            api_key: None,
            debug: true,
            mock: false,
            environment: AppEnvironment::Development,
        }
    }
}

impl ClientConfig {
    /// Creates the default configuration pointed at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Full API root: `{base_url}/api/{api_version}`.
    pub fn api_root(&self) -> String {
        format!(
            "{}/api/{}",
            self.base_url.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AppEnvironment {
    Development,
    Production,
    Other,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        match value {
            "development" => Self::Development,
            "production" => Self::Production,
            _ => Self::Other,
        }
    }
}

/// Persisted settings object written by [`ConfigResolver::save_api_url`].
#[derive(Debug, Default, Deserialize, Serialize)]
struct ApiSettings {
    #[serde(rename = "apiUrl", default, skip_serializing_if = "Option::is_none")]
    api_url: Option<String>,
}

/// Resolves [`ClientConfig`] values from environment variables and a
/// persisted override.
///
/// Environment variables are captured when the resolver is built, so
/// resolution is a pure read.
#[derive(Clone)]
pub struct ConfigResolver {
    vars: HashMap<String, String>,
    storage: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("vars", &self.vars.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ConfigResolver {
    /// Captures every `KB_*` variable from the process environment.
    pub fn from_env(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_vars(
            std::env::vars().filter(|(key, _)| key.starts_with("KB_")),
            storage,
        )
    }

    /// Builds a resolver over an explicit variable set.
    pub fn with_vars<I, K, V>(vars: I, storage: Arc<dyn KeyValueStore>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            storage,
        }
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Persisted override, then `KB_API_BASE_URL`, then
    /// [`DEFAULT_BASE_URL`].
    pub fn resolve_base_url(&self) -> String {
        self.stored_api_url()
            .or_else(|| self.var(ENV_BASE_URL).map(str::to_owned))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned())
    }

    fn stored_api_url(&self) -> Option<String> {
        let raw = self.storage.get(API_SETTINGS_KEY)?;
        match serde_json::from_str::<ApiSettings>(&raw) {
            Ok(settings) => settings.api_url.filter(|url| !url.trim().is_empty()),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    error = %_err,
                    "failed to parse stored API settings, ignoring override"
                );
                None
            }
        }
    }

    pub fn resolve_timeout(&self) -> u64 {
        let Some(raw) = self.var(ENV_TIMEOUT) else {
            return DEFAULT_TIMEOUT_MS;
        };
        match raw.parse::<u64>() {
            Ok(timeout) if timeout > 0 => timeout,
            _ => {
                #[cfg(feature = "tracing")]
                tracing::warn!(value = raw, "invalid KB_API_TIMEOUT, using default");
                DEFAULT_TIMEOUT_MS
            }
        }
    }

    pub fn resolve_api_version(&self) -> String {
        self.var(ENV_API_VERSION)
            .unwrap_or(DEFAULT_API_VERSION)
            .to_owned()
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        self.var(ENV_API_KEY).map(str::to_owned)
    }

    /// Enabled unless `KB_ENABLE_DEBUG` is set to anything but `true`.
    pub fn debug_enabled(&self) -> bool {
        self.var(ENV_ENABLE_DEBUG).map_or(true, |value| value == "true")
    }

    pub fn mock_enabled(&self) -> bool {
        self.var(ENV_ENABLE_MOCK) == Some("true")
    }

    pub fn app_environment(&self) -> AppEnvironment {
        AppEnvironment::parse(self.var(ENV_APP_ENV).unwrap_or("development"))
    }

    pub fn resolve(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.resolve_base_url(),
            timeout_ms: self.resolve_timeout(),
            api_version: self.resolve_api_version(),
            api_key: self.resolve_api_key(),
            debug: self.debug_enabled(),
            mock: self.mock_enabled(),
            environment: self.app_environment(),
        }
    }

    /// Persists a base URL override that wins over the environment.
    pub fn save_api_url(&self, url: &str) {
        let settings = ApiSettings {
            api_url: Some(url.trim().to_owned()),
        };
        // Serializing a struct with one string field cannot fail.
        if let Ok(raw) = serde_json::to_string(&settings) {
            self.storage.set(API_SETTINGS_KEY, raw);
        }
    }

    pub fn clear_api_url(&self) {
        self.storage.remove(API_SETTINGS_KEY);
    }
}

/// Checks the shape of a pre-issued API key: at least 20 characters of
/// ASCII letters, digits, `_` or `-`.
pub fn validate_api_key(key: &str) -> bool {
    key.len() >= 20
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}
