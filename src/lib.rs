//! `knowledge-base-client` is an async HTTP client for the knowledge-base
//! document API.
//!
//! - [`ApiClient`] dispatches requests with observer hooks and error
//!   notifications; [`ApiClient::knowledge`] and [`ApiClient::admin`] expose
//!   the typed operations.
//! - [`RetryPolicy`] wraps any operation with exponential backoff.
//! - [`ApiStore`] caches responses with TTLs and tracks request health.
//! - [`ConfigResolver`] reads settings from `KB_*` environment variables and
//!   a persisted override.

pub mod classify;
mod client;
pub mod config;
pub mod dashboard;
mod error;
pub mod observer;
mod retry;
mod service;
pub mod storage;
mod store;
pub mod types;

pub use classify::{classify, ErrorKind, ErrorRecord, FailureCause};
pub use client::{
    ApiClient, FormPart, MultipartForm, RequestBody, RequestDescriptor, RequestOptions,
    ResponseEnvelope,
};
pub use config::{validate_api_key, AppEnvironment, ClientConfig, ConfigResolver};
pub use dashboard::DashboardCache;
pub use error::ApiError;
pub use observer::{Notifier, RequestObserver};
pub use retry::{retry, RetryCondition, RetryPolicy, Retryable};
pub use service::{AdminService, KnowledgeService, UploadRequest};
pub use storage::{KeyValueStore, MemoryStore};
pub use store::{cache_key, ApiStore, CacheEntry, RequestStats, DEFAULT_TTL};

pub type Result<T> = std::result::Result<T, ApiError>;
